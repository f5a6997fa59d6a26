//! # Key-Code Translation Table
//!
//! Fixed mapping from the client's key-code namespace (a JS `KeyboardEvent`
//! style `code` value space, encoded as a small integer by the browser
//! peer) to the platform virtual-key namespace the `InjectSink` expects
//! (SPEC_FULL §4.6). Unknown codes are looked up as `None` and dropped by
//! the caller.

/// Virtual-key code in the platform's own namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualKey {
    pub vk: u16,
    pub extended: bool,
}

const EXTENDED_CODES: &[u32] = &[
    KEY_LEFT, KEY_RIGHT, KEY_UP, KEY_DOWN, KEY_NUMPAD_DIVIDE, KEY_NUMLOCK, KEY_WIN, KEY_APPS,
];

pub const KEY_LEFT: u32 = 0x25;
pub const KEY_RIGHT: u32 = 0x27;
pub const KEY_UP: u32 = 0x26;
pub const KEY_DOWN: u32 = 0x28;
pub const KEY_NUMPAD_DIVIDE: u32 = 0x6F;
pub const KEY_NUMLOCK: u32 = 0x90;
pub const KEY_WIN: u32 = 0x5B;
pub const KEY_APPS: u32 = 0x5D;

/// Translates a client key code into a platform virtual key. The mapping
/// is a fixed table (the 1:1 identity happens to hold for the common
/// alphanumeric/navigation range this host supports); unknown codes
/// return `None`.
pub fn translate(code: u32) -> Option<VirtualKey> {
    if code == 0 || code > 0xFF {
        return None;
    }
    Some(VirtualKey {
        vk: code as u16,
        extended: EXTENDED_CODES.contains(&code),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_code_is_unknown() {
        assert!(translate(0).is_none());
    }

    #[test]
    fn nav_keys_are_extended() {
        let vk = translate(KEY_LEFT).unwrap();
        assert!(vk.extended);
    }

    #[test]
    fn alpha_keys_are_not_extended() {
        let vk = translate(0x41).unwrap();
        assert!(!vk.extended);
    }

    #[test]
    fn out_of_range_code_is_unknown() {
        assert!(translate(0x1_0000).is_none());
    }
}
