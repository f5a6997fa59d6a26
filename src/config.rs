//! # Configuration
//!
//! `HostConfig` holds everything the supervisor needs at startup that isn't
//! negotiated over the wire: the signaling bind address, ICE servers and
//! port range, initial capture FPS, and the `auth.json` path. `AuthRecord`
//! is the persisted `{username, pin}` credential pair (SPEC_FULL §6).

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{HostError, HostResult};

/// Top-level host configuration, built from CLI flags with environment
/// overrides in `main.rs`.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Address the signaling HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// Public STUN servers offered to the peer connection.
    pub stun_servers: Vec<String>,
    /// Host-side UDP port range for ICE candidates (narrow, per §4.5.1).
    pub ice_port_range: (u16, u16),
    /// Initial capture FPS, before any `MSG_FPS_SET` negotiation.
    pub initial_fps: u32,
    /// Size of the capture stage's texture pool (N ≥ 8, §3).
    pub pool_size: usize,
    /// Path to the persisted auth credential file.
    pub auth_file: PathBuf,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8787".parse().unwrap(),
            stun_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
            ],
            ice_port_range: (50000, 50100),
            initial_fps: 60,
            pool_size: 8,
            auth_file: PathBuf::from("auth.json"),
        }
    }
}

impl HostConfig {
    /// Validates all fields, mirroring the bounds in SPEC_FULL §6.
    pub fn validate(&self) -> HostResult<()> {
        if !(1..=240).contains(&self.initial_fps) {
            return Err(HostError::validation(
                "initial_fps",
                "must be in [1, 240]",
                self.initial_fps.to_string(),
            ));
        }
        if self.pool_size < 8 || self.pool_size > 32 {
            return Err(HostError::validation(
                "pool_size",
                "must be in [8, 32] (in-flight bitmap is 32 bits wide)",
                self.pool_size.to_string(),
            ));
        }
        if self.ice_port_range.0 >= self.ice_port_range.1 {
            return Err(HostError::validation(
                "ice_port_range",
                "lower bound must be < upper bound",
                format!("{:?}", self.ice_port_range),
            ));
        }
        if self.stun_servers.is_empty() {
            return Err(HostError::validation(
                "stun_servers",
                "must not be empty",
                "[]",
            ));
        }
        Ok(())
    }
}

/// Persisted host credentials (`auth.json`). Usernames are 3-32 chars of
/// `[A-Za-z0-9_-]`; PINs are exactly 6 ASCII digits (SPEC_FULL §6, B3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthRecord {
    pub username: String,
    pub pin: String,
}

impl AuthRecord {
    pub fn new(username: impl Into<String>, pin: impl Into<String>) -> HostResult<Self> {
        let record = Self {
            username: username.into(),
            pin: pin.into(),
        };
        record.validate()?;
        Ok(record)
    }

    pub fn validate(&self) -> HostResult<()> {
        let len = self.username.len();
        if !(3..=32).contains(&len) {
            return Err(HostError::validation(
                "username",
                "length must be in [3, 32]",
                len.to_string(),
            ));
        }
        if !self
            .username
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
        {
            return Err(HostError::validation(
                "username",
                "must match [A-Za-z0-9_-]+",
                self.username.clone(),
            ));
        }
        if self.pin.len() != 6 || !self.pin.bytes().all(|b| b.is_ascii_digit()) {
            return Err(HostError::validation(
                "pin",
                "must be exactly 6 digits",
                self.pin.clone(),
            ));
        }
        Ok(())
    }

    /// Loads and validates credentials from `path`.
    pub fn load(path: &Path) -> HostResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| HostError::io_path("read auth.json", path.display().to_string(), e))?;
        let record: Self = serde_json::from_str(&text)?;
        record.validate()?;
        Ok(record)
    }

    pub fn save(&self, path: &Path) -> HostResult<()> {
        self.validate()?;
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)
            .map_err(|e| HostError::io_path("write auth.json", path.display().to_string(), e))
    }

    /// Credential check against a decoded `AUTH_REQUEST`. The wire protocol
    /// sends the PIN in plaintext over an authenticated data channel, so
    /// this matches the corresponding trust level rather than hashing.
    pub fn matches(&self, username: &str, pin: &str) -> bool {
        self.username == username && self.pin == pin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(HostConfig::default().validate().is_ok());
    }

    #[test]
    fn fps_bounds_b1() {
        let mut config = HostConfig::default();
        config.initial_fps = 0;
        assert!(config.validate().is_err());
        config.initial_fps = 1;
        assert!(config.validate().is_ok());
        config.initial_fps = 240;
        assert!(config.validate().is_ok());
        config.initial_fps = 241;
        assert!(config.validate().is_err());
    }

    #[test]
    fn username_length_boundary_b3() {
        assert!(AuthRecord::new("ab", "123456").is_err());
        assert!(AuthRecord::new("abc", "123456").is_ok());
        assert!(AuthRecord::new("a".repeat(32), "123456").is_ok());
        assert!(AuthRecord::new("a".repeat(33), "123456").is_err());
    }

    #[test]
    fn pin_must_be_six_digits() {
        assert!(AuthRecord::new("alice", "12345").is_err());
        assert!(AuthRecord::new("alice", "1234567").is_err());
        assert!(AuthRecord::new("alice", "12345a").is_err());
        assert!(AuthRecord::new("alice", "123456").is_ok());
    }

    #[test]
    fn matches_checks_both_fields() {
        let record = AuthRecord::new("alice", "123456").unwrap();
        assert!(record.matches("alice", "123456"));
        assert!(!record.matches("alice", "000000"));
        assert!(!record.matches("bob", "123456"));
    }
}
