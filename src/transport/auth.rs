//! # Authentication Handshake
//!
//! Runs entirely inside the data channel, not in signaling (SPEC_FULL
//! §4.5.1). Before authentication, every frame and every control message
//! other than `AUTH_REQUEST` is dropped — enforced by the caller checking
//! `PeerSession::is_authenticated` before routing, with this module
//! deciding only the credential check itself.

use crate::config::AuthRecord;

use super::wire::AuthRequest;

pub enum AuthOutcome {
    Accepted,
    Rejected { reason: &'static str },
}

/// Checks a decoded `AUTH_REQUEST` against the persisted credential record.
pub fn authenticate(record: &AuthRecord, request: &AuthRequest) -> AuthOutcome {
    if record.matches(&request.username, &request.pin) {
        AuthOutcome::Accepted
    } else {
        AuthOutcome::Rejected {
            reason: "Invalid credentials",
        }
    }
}

/// Whether a message with this magic may be processed before authentication.
/// Only `AUTH_REQUEST` passes; everything else — frames included — is
/// dropped per §4.5.1.
pub fn allowed_before_auth(magic: u32) -> bool {
    magic == super::wire::MSG_AUTH_REQUEST
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> AuthRecord {
        AuthRecord::new("alice", "123456").unwrap()
    }

    #[test]
    fn correct_credentials_accepted() {
        let request = AuthRequest {
            username: "alice".into(),
            pin: "123456".into(),
        };
        assert!(matches!(
            authenticate(&record(), &request),
            AuthOutcome::Accepted
        ));
    }

    #[test]
    fn bad_pin_rejected() {
        let request = AuthRequest {
            username: "alice".into(),
            pin: "000000".into(),
        };
        assert!(matches!(
            authenticate(&record(), &request),
            AuthOutcome::Rejected { .. }
        ));
    }

    #[test]
    fn only_auth_request_allowed_before_auth() {
        assert!(allowed_before_auth(super::super::wire::MSG_AUTH_REQUEST));
        assert!(!allowed_before_auth(super::super::wire::MSG_PING));
        assert!(!allowed_before_auth(super::super::wire::MSG_MOUSE_MOVE));
    }
}
