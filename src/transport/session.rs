//! # Peer Session State
//!
//! The small set of atomics the rest of the system reads to know what the
//! transport is currently allowed to do (SPEC_FULL §4.5.1). `needs_key` is
//! consume-on-read: the encoder thread samples and clears it in one step.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Idle,
    ConnectedUnauthenticated,
    Authenticated,
    Disconnected,
}

#[derive(Debug)]
pub struct PeerSession {
    state: Mutex<PeerState>,
    connected: AtomicBool,
    authenticated: AtomicBool,
    fps_confirmed: AtomicBool,
    needs_key: AtomicBool,
    last_ping_at: Mutex<Option<Instant>>,
}

impl Default for PeerSession {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerSession {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PeerState::Idle),
            connected: AtomicBool::new(false),
            authenticated: AtomicBool::new(false),
            fps_confirmed: AtomicBool::new(false),
            needs_key: AtomicBool::new(false),
            last_ping_at: Mutex::new(None),
        }
    }

    /// Resets every field to a fresh pre-connection state; called whenever
    /// the transport tears down a peer to build a new one (§4.5.1).
    pub fn reset(&self) {
        *self.state.lock().unwrap() = PeerState::Idle;
        self.connected.store(false, Ordering::Release);
        self.authenticated.store(false, Ordering::Release);
        self.fps_confirmed.store(false, Ordering::Release);
        self.needs_key.store(false, Ordering::Release);
        *self.last_ping_at.lock().unwrap() = None;
    }

    pub fn on_data_channel_open(&self) {
        *self.state.lock().unwrap() = PeerState::ConnectedUnauthenticated;
        self.connected.store(true, Ordering::Release);
        *self.last_ping_at.lock().unwrap() = Some(Instant::now());
    }

    pub fn on_authenticated(&self) {
        *self.state.lock().unwrap() = PeerState::Authenticated;
        self.authenticated.store(true, Ordering::Release);
    }

    pub fn on_disconnected(&self) {
        *self.state.lock().unwrap() = PeerState::Disconnected;
        self.connected.store(false, Ordering::Release);
        self.authenticated.store(false, Ordering::Release);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::Acquire)
    }

    pub fn is_fps_confirmed(&self) -> bool {
        self.fps_confirmed.load(Ordering::Acquire)
    }

    pub fn set_fps_confirmed(&self, confirmed: bool) {
        self.fps_confirmed.store(confirmed, Ordering::Release);
    }

    pub fn set_needs_key(&self) {
        self.needs_key.store(true, Ordering::Release);
    }

    /// Consume-on-read: the encoder thread samples this once per frame and
    /// the flag clears atomically with the read.
    pub fn take_needs_key(&self) -> bool {
        self.needs_key.swap(false, Ordering::AcqRel)
    }

    pub fn record_ping(&self) {
        *self.last_ping_at.lock().unwrap() = Some(Instant::now());
    }

    /// Age of the last received ping; `None` if none has arrived yet.
    pub fn ping_age(&self) -> Option<std::time::Duration> {
        self.last_ping_at.lock().unwrap().map(|t| t.elapsed())
    }

    pub fn state(&self) -> PeerState {
        *self.state.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unauthenticated_p6() {
        let session = PeerSession::new();
        assert!(!session.is_authenticated());
        session.on_data_channel_open();
        assert!(session.is_connected());
        assert!(!session.is_authenticated());
    }

    #[test]
    fn needs_key_is_consume_on_read() {
        let session = PeerSession::new();
        assert!(!session.take_needs_key());
        session.set_needs_key();
        assert!(session.take_needs_key());
        assert!(!session.take_needs_key());
    }

    #[test]
    fn reset_clears_everything() {
        let session = PeerSession::new();
        session.on_data_channel_open();
        session.on_authenticated();
        session.set_needs_key();
        session.reset();
        assert!(!session.is_connected());
        assert!(!session.is_authenticated());
        assert!(!session.take_needs_key());
        assert!(session.ping_age().is_none());
    }

    #[test]
    fn ping_age_boundary_b4() {
        let session = PeerSession::new();
        session.on_data_channel_open();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let age = session.ping_age().unwrap();
        assert!(age.as_millis() < 3000);
    }
}
