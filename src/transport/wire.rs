//! # Wire Protocol
//!
//! Bit-exact little-endian layouts for the data channel (SPEC_FULL §3,
//! §4.5.5, §4.5.6, §6). Every struct here round-trips through `encode`/
//! `decode` with no allocation beyond the returned `Vec<u8>`/slices.

use crate::error::{HostError, HostResult};

pub const MSG_PING: u32 = 0x504E_4750;
pub const MSG_FPS_SET: u32 = 0x4650_5343;
pub const MSG_HOST_INFO: u32 = 0x484F_5354;
pub const MSG_FPS_ACK: u32 = 0x4650_5341;
pub const MSG_REQUEST_KEY: u32 = 0x4B45_5952;
pub const MSG_MONITOR_LIST: u32 = 0x4D4F_4E4C;
pub const MSG_MONITOR_SET: u32 = 0x4D4F_4E53;
pub const MSG_AUDIO_DATA: u32 = 0x4155_4449;
pub const MSG_MOUSE_MOVE: u32 = 0x4D4F_5645;
pub const MSG_MOUSE_BTN: u32 = 0x4D42_544E;
pub const MSG_MOUSE_WHEEL: u32 = 0x4D57_484C;
pub const MSG_KEY: u32 = 0x4B45_5920;
pub const MSG_AUTH_REQUEST: u32 = 0x4155_5448;
pub const MSG_AUTH_RESPONSE: u32 = 0x4155_5452;

pub const CHUNK_HEADER_LEN: usize = 21;
pub const MAX_CHUNK_PAYLOAD: usize = 1179;
pub const MAX_CHUNK_COUNT: usize = 65535;

/// 21-byte chunk header, bit-exact per SPEC_FULL §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub capture_ts_us: i64,
    pub encode_us: u32,
    pub frame_id: u32,
    pub chunk_index: u16,
    pub chunk_total: u16,
    pub frame_type: u8,
}

impl ChunkHeader {
    pub fn is_key(self) -> bool {
        self.frame_type == 1
    }

    pub fn encode(self) -> [u8; CHUNK_HEADER_LEN] {
        let mut buf = [0u8; CHUNK_HEADER_LEN];
        buf[0..8].copy_from_slice(&self.capture_ts_us.to_le_bytes());
        buf[8..12].copy_from_slice(&self.encode_us.to_le_bytes());
        buf[12..16].copy_from_slice(&self.frame_id.to_le_bytes());
        buf[16..18].copy_from_slice(&self.chunk_index.to_le_bytes());
        buf[18..20].copy_from_slice(&self.chunk_total.to_le_bytes());
        buf[20] = self.frame_type;
        buf
    }

    pub fn decode(bytes: &[u8]) -> HostResult<Self> {
        if bytes.len() < CHUNK_HEADER_LEN {
            return Err(HostError::transport("decode chunk header", "buffer too short"));
        }
        Ok(Self {
            capture_ts_us: i64::from_le_bytes(bytes[0..8].try_into().unwrap()),
            encode_us: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
            frame_id: u32::from_le_bytes(bytes[12..16].try_into().unwrap()),
            chunk_index: u16::from_le_bytes(bytes[16..18].try_into().unwrap()),
            chunk_total: u16::from_le_bytes(bytes[18..20].try_into().unwrap()),
            frame_type: bytes[20],
        })
    }
}

/// Splits an access unit into chunks of at most `MAX_CHUNK_PAYLOAD` bytes,
/// per §4.5.3. Rejects empty input and inputs needing more than
/// `MAX_CHUNK_COUNT` chunks (B2, P3).
pub fn split_into_chunks(
    data: &[u8],
    frame_id: u32,
    capture_ts_us: i64,
    encode_us: u32,
    is_key: bool,
) -> HostResult<Vec<Vec<u8>>> {
    if data.is_empty() {
        return Err(HostError::frame_pipeline("split_into_chunks", "access unit is empty"));
    }
    let chunk_total = data.len().div_ceil(MAX_CHUNK_PAYLOAD);
    if chunk_total > MAX_CHUNK_COUNT {
        return Err(HostError::frame_pipeline(
            "split_into_chunks",
            format!("{chunk_total} chunks exceeds {MAX_CHUNK_COUNT}"),
        ));
    }
    let frame_type = if is_key { 1 } else { 0 };
    let mut chunks = Vec::with_capacity(chunk_total);
    for (i, payload) in data.chunks(MAX_CHUNK_PAYLOAD).enumerate() {
        let header = ChunkHeader {
            capture_ts_us,
            encode_us,
            frame_id,
            chunk_index: i as u16,
            chunk_total: chunk_total as u16,
            frame_type,
        };
        let mut buf = Vec::with_capacity(CHUNK_HEADER_LEN + payload.len());
        buf.extend_from_slice(&header.encode());
        buf.extend_from_slice(payload);
        chunks.push(buf);
    }
    Ok(chunks)
}

/// Reassembles chunks (in any order) back into the original byte sequence.
/// Used by tests to exercise the round-trip property (R3); a real receiver
/// lives on the browser side, out of scope for this crate.
pub fn reassemble(chunks: &[Vec<u8>]) -> HostResult<Vec<u8>> {
    if chunks.is_empty() {
        return Err(HostError::transport("reassemble", "no chunks"));
    }
    let mut headers = Vec::with_capacity(chunks.len());
    for chunk in chunks {
        headers.push((ChunkHeader::decode(chunk)?, &chunk[CHUNK_HEADER_LEN..]));
    }
    headers.sort_by_key(|(h, _)| h.chunk_index);
    let total = headers[0].0.chunk_total as usize;
    if headers.len() != total {
        return Err(HostError::transport("reassemble", "missing chunks"));
    }
    let mut out = Vec::new();
    for (header, payload) in &headers {
        if header.chunk_index as usize >= header.chunk_total as usize {
            return Err(HostError::transport("reassemble", "chunk_index >= chunk_total"));
        }
        out.extend_from_slice(payload);
    }
    Ok(out)
}

/// `MSG_PING` request, client→host, 16 bytes (§4.5.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingRequest {
    pub client_send_ts: u64,
}

impl PingRequest {
    pub const LEN: usize = 16;

    pub fn decode(bytes: &[u8]) -> HostResult<Self> {
        if bytes.len() != Self::LEN {
            return Err(HostError::transport("decode ping", "wrong size"));
        }
        Ok(Self {
            client_send_ts: u64::from_le_bytes(bytes[4..12].try_into().unwrap()),
        })
    }
}

/// Host pong reply, 24 bytes (§4.5.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingReply {
    pub client_send_ts: u64,
    pub host_ts: u64,
}

impl PingReply {
    pub const LEN: usize = 24;

    pub fn encode(self) -> [u8; Self::LEN] {
        let mut buf = [0u8; Self::LEN];
        buf[0..4].copy_from_slice(&MSG_PING.to_le_bytes());
        buf[4..12].copy_from_slice(&self.client_send_ts.to_le_bytes());
        buf[12..20].copy_from_slice(&self.host_ts.to_le_bytes());
        buf
    }
}

/// `MSG_FPS_SET`, 7 bytes total (4 magic + 2 fps + 1 mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FpsSet {
    pub fps: u16,
    pub mode: u8,
}

impl FpsSet {
    pub const LEN: usize = 7;

    pub fn decode(bytes: &[u8]) -> HostResult<Self> {
        if bytes.len() != Self::LEN {
            return Err(HostError::transport("decode fps_set", "wrong size"));
        }
        Ok(Self {
            fps: u16::from_le_bytes(bytes[4..6].try_into().unwrap()),
            mode: bytes[6],
        })
    }
}

pub fn encode_fps_ack(fps: u16, mode: u8) -> [u8; 7] {
    let mut buf = [0u8; 7];
    buf[0..4].copy_from_slice(&MSG_FPS_ACK.to_le_bytes());
    buf[4..6].copy_from_slice(&fps.to_le_bytes());
    buf[6] = mode;
    buf
}

pub fn encode_host_info(host_fps: u16) -> [u8; 6] {
    let mut buf = [0u8; 6];
    buf[0..4].copy_from_slice(&MSG_HOST_INFO.to_le_bytes());
    buf[4..6].copy_from_slice(&host_fps.to_le_bytes());
    buf
}

/// `MSG_MONITOR_SET`, 5 bytes (4 magic + 1 index).
pub fn decode_monitor_set(bytes: &[u8]) -> HostResult<u8> {
    if bytes.len() != 5 {
        return Err(HostError::transport("decode monitor_set", "wrong size"));
    }
    Ok(bytes[4])
}

/// One entry in `MSG_MONITOR_LIST`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorEntry {
    pub index: u8,
    pub width: u16,
    pub height: u16,
    pub refresh_hz: u16,
    pub primary: bool,
    pub name: String,
}

pub fn encode_monitor_list(current: u8, monitors: &[MonitorEntry]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&MSG_MONITOR_LIST.to_le_bytes());
    buf.push(monitors.len() as u8);
    buf.push(current);
    for monitor in monitors {
        buf.push(monitor.index);
        buf.extend_from_slice(&monitor.width.to_le_bytes());
        buf.extend_from_slice(&monitor.height.to_le_bytes());
        buf.extend_from_slice(&monitor.refresh_hz.to_le_bytes());
        buf.push(monitor.primary as u8);
        let name_bytes = monitor.name.as_bytes();
        let name_len = name_bytes.len().min(255) as u8;
        buf.push(name_len);
        buf.extend_from_slice(&name_bytes[..name_len as usize]);
    }
    buf
}

/// `{MSG_AUDIO_DATA, capture_ts i64, samples u16, data_len u16}` + payload.
pub fn encode_audio_header(capture_ts_us: i64, samples: u16, data_len: u16) -> [u8; 16] {
    let mut buf = [0u8; 16];
    buf[0..4].copy_from_slice(&MSG_AUDIO_DATA.to_le_bytes());
    buf[4..12].copy_from_slice(&capture_ts_us.to_le_bytes());
    buf[12..14].copy_from_slice(&samples.to_le_bytes());
    buf[14..16].copy_from_slice(&data_len.to_le_bytes());
    buf
}

/// `{magic u32, user_len u8, pin_len u8, user bytes, pin bytes}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub username: String,
    pub pin: String,
}

impl AuthRequest {
    pub fn decode(bytes: &[u8]) -> HostResult<Self> {
        if bytes.len() < 6 {
            return Err(HostError::auth("decode auth_request", "buffer too short"));
        }
        let user_len = bytes[4] as usize;
        let pin_len = bytes[5] as usize;
        let expected = 6 + user_len + pin_len;
        if bytes.len() != expected {
            return Err(HostError::auth("decode auth_request", "length mismatch"));
        }
        let username = String::from_utf8(bytes[6..6 + user_len].to_vec())
            .map_err(|_| HostError::auth("decode auth_request", "username not utf8"))?;
        let pin = String::from_utf8(bytes[6 + user_len..expected].to_vec())
            .map_err(|_| HostError::auth("decode auth_request", "pin not utf8"))?;
        Ok(Self { username, pin })
    }
}

/// `{magic u32, success u8, err_len u8, err_bytes?}`.
pub fn encode_auth_response(success: bool, error: Option<&str>) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&MSG_AUTH_RESPONSE.to_le_bytes());
    buf.push(success as u8);
    let error_bytes = error.unwrap_or("").as_bytes();
    let err_len = error_bytes.len().min(255) as u8;
    buf.push(err_len);
    buf.extend_from_slice(&error_bytes[..err_len as usize]);
    buf
}

/// `MSG_MOUSE_MOVE`, 12 bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseMove {
    pub nx: f32,
    pub ny: f32,
}

impl MouseMove {
    pub const LEN: usize = 12;
    pub fn decode(bytes: &[u8]) -> HostResult<Self> {
        if bytes.len() != Self::LEN {
            return Err(HostError::input_router("mouse_move: wrong size"));
        }
        Ok(Self {
            nx: f32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            ny: f32::from_le_bytes(bytes[8..12].try_into().unwrap()),
        })
    }
}

/// `MSG_MOUSE_BTN`, 6 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseButton {
    pub button: u8,
    pub down: bool,
}

impl MouseButton {
    pub const LEN: usize = 6;
    pub fn decode(bytes: &[u8]) -> HostResult<Self> {
        if bytes.len() != Self::LEN {
            return Err(HostError::input_router("mouse_button: wrong size"));
        }
        Ok(Self {
            button: bytes[4],
            down: bytes[5] != 0,
        })
    }
}

/// `MSG_MOUSE_WHEEL`, 12 bytes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseWheel {
    pub dx: f32,
    pub dy: f32,
}

impl MouseWheel {
    pub const LEN: usize = 12;
    pub fn decode(bytes: &[u8]) -> HostResult<Self> {
        if bytes.len() != Self::LEN {
            return Err(HostError::input_router("mouse_wheel: wrong size"));
        }
        Ok(Self {
            dx: f32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            dy: f32::from_le_bytes(bytes[8..12].try_into().unwrap()),
        })
    }
}

/// `MSG_KEY`, 14 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub code: u32,
    pub scan: u32,
    pub down: bool,
    pub mods: u8,
}

impl KeyEvent {
    pub const LEN: usize = 14;
    pub fn decode(bytes: &[u8]) -> HostResult<Self> {
        if bytes.len() != Self::LEN {
            return Err(HostError::input_router("key: wrong size"));
        }
        Ok(Self {
            code: u32::from_le_bytes(bytes[4..8].try_into().unwrap()),
            scan: u32::from_le_bytes(bytes[8..12].try_into().unwrap()),
            down: bytes[12] != 0,
            mods: bytes[13],
        })
    }
}

/// Reads the 4-byte magic prefix common to every control message.
pub fn peek_magic(bytes: &[u8]) -> HostResult<u32> {
    if bytes.len() < 4 {
        return Err(HostError::transport("peek_magic", "buffer too short"));
    }
    Ok(u32::from_le_bytes(bytes[0..4].try_into().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_header_round_trips() {
        let header = ChunkHeader {
            capture_ts_us: 123_456_789,
            encode_us: 4200,
            frame_id: 7,
            chunk_index: 2,
            chunk_total: 5,
            frame_type: 1,
        };
        let encoded = header.encode();
        assert_eq!(encoded.len(), CHUNK_HEADER_LEN);
        assert_eq!(ChunkHeader::decode(&encoded).unwrap(), header);
    }

    #[test]
    fn split_and_reassemble_round_trip_r3() {
        let data = vec![7u8; 5000];
        let chunks = split_into_chunks(&data, 1, 10, 20, true).unwrap();
        assert_eq!(chunks.len(), 5000usize.div_ceil(MAX_CHUNK_PAYLOAD));
        let mut shuffled = chunks.clone();
        shuffled.reverse();
        assert_eq!(reassemble(&shuffled).unwrap(), data);
    }

    #[test]
    fn split_rejects_empty_access_unit_b2() {
        assert!(split_into_chunks(&[], 1, 0, 0, false).is_err());
    }

    #[test]
    fn chunk_index_always_less_than_total_p3() {
        let data = vec![1u8; 3000];
        let chunks = split_into_chunks(&data, 1, 0, 0, false).unwrap();
        for chunk in &chunks {
            let header = ChunkHeader::decode(chunk).unwrap();
            assert!(header.chunk_index < header.chunk_total);
        }
    }

    #[test]
    fn auth_request_round_trips() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MSG_AUTH_REQUEST.to_le_bytes());
        bytes.push(5);
        bytes.push(6);
        bytes.extend_from_slice(b"alice");
        bytes.extend_from_slice(b"123456");
        let decoded = AuthRequest::decode(&bytes).unwrap();
        assert_eq!(decoded.username, "alice");
        assert_eq!(decoded.pin, "123456");
    }

    #[test]
    fn fps_set_decodes_fields() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&MSG_FPS_SET.to_le_bytes());
        bytes.extend_from_slice(&60u16.to_le_bytes());
        bytes.push(0);
        let decoded = FpsSet::decode(&bytes).unwrap();
        assert_eq!(decoded.fps, 60);
        assert_eq!(decoded.mode, 0);
    }
}
