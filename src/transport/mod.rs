//! # Peer Transport
//!
//! The hardest part of the system (SPEC_FULL §4.5): connection lifecycle,
//! authentication, chunked video delivery with backpressure discipline,
//! best-effort audio, and the control-message plane. `PeerTransport` is
//! the façade the Supervisor talks to; it owns a `PeerTransportHandle`
//! (the Tokio runtime + webrtc-rs peer) and the plain synchronous state
//! (`BackpressureTracker`) that doesn't need to live inside that runtime.

pub mod auth;
pub mod backpressure;
pub mod peer;
pub mod session;
pub mod wire;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use crate::config::AuthRecord;
use crate::error::{HostError, HostResult};
use crate::monitor::{MonitorList, MonitorRecord};

use self::backpressure::{BackpressureTracker, FrameDecision, STALE_DISCONNECT_TRIPS};
use self::peer::{PeerTransportConfig, PeerTransportHandle};
use self::session::PeerSession;
use self::wire::{
    decode_monitor_set, encode_audio_header, encode_auth_response, encode_fps_ack,
    encode_host_info, encode_monitor_list, split_into_chunks, AuthRequest, MonitorEntry,
    MAX_CHUNK_COUNT,
};

pub const PING_STALE_AFTER: Duration = Duration::from_millis(3000);
const MAX_AUDIO_PAYLOAD: usize = 4000;
const AUDIO_BACKPRESSURE_TRIPS_LIMIT: u32 = 5;

pub struct DisconnectReason(pub &'static str);

/// Hooks the Supervisor installs once it exists, so the control-plane
/// handlers below (which run before the Supervisor is constructed, and
/// keep running after) can drive capture/input without this module
/// depending on `Supervisor` directly (SPEC_FULL §4.8's callback graph).
#[derive(Clone)]
pub struct TransportCallbacks {
    pub on_authenticated: Arc<dyn Fn() + Send + Sync>,
    pub on_disconnected: Arc<dyn Fn() + Send + Sync>,
    /// `(requested_fps, mode) -> confirmed_fps`; mode=1 coerces to the
    /// host's native refresh rate rather than honoring the request.
    pub on_fps_changed: Arc<dyn Fn(u32, u8) -> u32 + Send + Sync>,
    /// Returns whether the switch succeeded.
    pub on_monitor_changed: Arc<dyn Fn(u8) -> bool + Send + Sync>,
    pub route_input: Arc<dyn Fn(u32, &[u8]) -> HostResult<()> + Send + Sync>,
    pub monitors: Arc<MonitorList>,
    pub host_fps: Arc<dyn Fn() -> u16 + Send + Sync>,
}

pub struct PeerTransport {
    handle: PeerTransportHandle,
    backpressure: BackpressureTracker,
    auth: AuthRecord,
    dropped_frames: AtomicU64,
    on_disconnect: Arc<dyn Fn(&str) + Send + Sync>,
    callbacks: Mutex<Option<TransportCallbacks>>,
}

impl PeerTransport {
    /// Builds the transport and wires the data channel's inbound byte
    /// stream straight back to `handle_message`, via a `Weak` self-reference
    /// installed before the first offer can ever arrive.
    pub fn new(
        config: PeerTransportConfig,
        auth: AuthRecord,
        on_disconnect: Arc<dyn Fn(&str) + Send + Sync>,
    ) -> HostResult<Arc<Self>> {
        let handle = PeerTransportHandle::new(config)?;
        let transport = Arc::new_cyclic(|weak: &Weak<PeerTransport>| {
            let weak = weak.clone();
            handle.set_message_dispatcher(Arc::new(move |bytes: &[u8]| {
                if let Some(transport) = weak.upgrade() {
                    if let Err(e) = transport.handle_message(bytes) {
                        tracing::warn!(error = %e, "failed to handle inbound control message");
                    }
                }
            }));
            Self {
                handle,
                backpressure: BackpressureTracker::new(),
                auth,
                dropped_frames: AtomicU64::new(0),
                on_disconnect,
                callbacks: Mutex::new(None),
            }
        });
        Ok(transport)
    }

    /// Installs the Supervisor's callback graph. Called once, right after
    /// the Supervisor is built, since construction order requires the
    /// transport to exist first (§4.8).
    pub fn set_callbacks(&self, callbacks: TransportCallbacks) {
        *self.callbacks.lock().unwrap() = Some(callbacks);
    }

    fn callbacks(&self) -> Option<TransportCallbacks> {
        self.callbacks.lock().unwrap().clone()
    }

    pub fn handle_offer(&self, sdp: &str) -> HostResult<String> {
        self.handle.handle_offer_blocking(sdp)
    }

    /// The runtime handle the signaling HTTP server is spawned onto.
    pub fn runtime_handle(&self) -> tokio::runtime::Handle {
        self.handle.runtime_handle()
    }

    pub fn is_connected(&self) -> bool {
        self.handle.is_connected()
    }

    pub fn is_authenticated(&self) -> bool {
        self.handle.is_authenticated()
    }

    fn session(&self) -> Option<Arc<PeerSession>> {
        self.handle.current().map(|p| Arc::clone(&p.session))
    }

    pub fn is_fps_confirmed(&self) -> bool {
        self.session().map(|s| s.is_fps_confirmed()).unwrap_or(false)
    }

    pub fn take_needs_key(&self) -> bool {
        self.session().map(|s| s.take_needs_key()).unwrap_or(false)
    }

    pub fn set_needs_key(&self) {
        if let Some(session) = self.session() {
            session.set_needs_key();
        }
    }

    /// Checks the two stale-connection conditions (§4.5.1) and disconnects
    /// if either has tripped.
    pub fn check_liveness(&self) {
        let Some(session) = self.session() else {
            return;
        };
        let ping_stale = session
            .ping_age()
            .map(|age| age >= PING_STALE_AFTER)
            .unwrap_or(false);
        if ping_stale {
            self.force_disconnect("ping liveness lost");
        } else if self.backpressure.should_disconnect() {
            self.force_disconnect("sustained backpressure");
        }
    }

    pub fn force_disconnect(&self, reason: &'static str) {
        self.handle.close_current_blocking();
        (self.on_disconnect)(reason);
        if let Some(callbacks) = self.callbacks() {
            (callbacks.on_disconnected)();
        }
    }

    /// Routes an inbound control-channel message. Before authentication,
    /// only `AUTH_REQUEST` is processed (§4.5.1, P6).
    pub fn handle_message(&self, bytes: &[u8]) -> HostResult<()> {
        let magic = wire::peek_magic(bytes)?;
        let Some(session) = self.session() else {
            return Err(HostError::state("transport", "handle_message", "no active peer"));
        };

        if !session.is_authenticated() && !auth::allowed_before_auth(magic) {
            return Ok(());
        }

        match magic {
            wire::MSG_AUTH_REQUEST => self.handle_auth_request(&session, bytes),
            wire::MSG_PING => self.handle_ping(&session, bytes),
            wire::MSG_FPS_SET => self.handle_fps_set(&session, bytes),
            wire::MSG_REQUEST_KEY => {
                session.set_needs_key();
                Ok(())
            }
            wire::MSG_MONITOR_SET => self.handle_monitor_set(&session, bytes),
            wire::MSG_MOUSE_MOVE | wire::MSG_MOUSE_BTN | wire::MSG_MOUSE_WHEEL | wire::MSG_KEY => {
                self.forward_to_input(magic, bytes)
            }
            _ => Ok(()),
        }
    }

    fn handle_auth_request(&self, session: &PeerSession, bytes: &[u8]) -> HostResult<()> {
        let request = AuthRequest::decode(bytes)?;
        match auth::authenticate(&self.auth, &request) {
            auth::AuthOutcome::Accepted => {
                session.on_authenticated();
                self.handle.send_binary_blocking(encode_auth_response(true, None).to_vec())?;
                if let Some(callbacks) = self.callbacks() {
                    (callbacks.on_authenticated)();
                }
                Ok(())
            }
            auth::AuthOutcome::Rejected { reason } => {
                self.handle
                    .send_binary_blocking(encode_auth_response(false, Some(reason)))?;
                let on_disconnect = Arc::clone(&self.on_disconnect);
                std::thread::spawn(move || {
                    std::thread::sleep(Duration::from_millis(100));
                    on_disconnect("authentication failed");
                });
                Ok(())
            }
        }
    }

    /// Forwards a decoded mouse/key magic straight to the Input Router
    /// (§4.5.5, "Mouse / key family → Forward to input router").
    fn forward_to_input(&self, magic: u32, bytes: &[u8]) -> HostResult<()> {
        match self.callbacks() {
            Some(callbacks) => (callbacks.route_input)(magic, bytes),
            None => Ok(()),
        }
    }

    /// §4.5.5: on success, flags a keyframe and re-sends the monitor list
    /// and host info so the client sees the new layout immediately.
    fn handle_monitor_set(&self, session: &PeerSession, bytes: &[u8]) -> HostResult<()> {
        let index = decode_monitor_set(bytes)?;
        let Some(callbacks) = self.callbacks() else {
            return Ok(());
        };
        if (callbacks.on_monitor_changed)(index) {
            session.set_needs_key();
            let monitors = callbacks.monitors.snapshot();
            self.send_monitor_list(index, &monitors)?;
            self.send_host_info((callbacks.host_fps)())?;
        }
        Ok(())
    }

    fn handle_ping(&self, session: &PeerSession, bytes: &[u8]) -> HostResult<()> {
        let request = wire::PingRequest::decode(bytes)?;
        session.record_ping();
        self.backpressure.clean_frame();
        let reply = wire::PingReply {
            client_send_ts: request.client_send_ts,
            host_ts: now_us() as u64,
        };
        self.handle.send_binary_blocking(reply.encode().to_vec())
    }

    /// mode=0 honors the requested fps as-is; mode=1 ignores it and coerces
    /// to the host's native refresh rate (§4.5.5); mode=2 is reserved and
    /// currently treated like mode=0. Either way, the confirmed value is
    /// propagated to capture before being acked.
    fn handle_fps_set(&self, session: &PeerSession, bytes: &[u8]) -> HostResult<()> {
        let request = wire::FpsSet::decode(bytes)?;
        if !(1..=240).contains(&request.fps) || request.mode > 2 {
            return Err(HostError::validation(
                "fps_set",
                "fps must be in [1,240], mode in {0,1,2}",
                format!("fps={} mode={}", request.fps, request.mode),
            ));
        }
        let confirmed = match self.callbacks() {
            Some(callbacks) => (callbacks.on_fps_changed)(request.fps as u32, request.mode),
            None => request.fps as u32,
        };
        session.set_fps_confirmed(true);
        self.handle
            .send_binary_blocking(encode_fps_ack(confirmed as u16, request.mode).to_vec())
    }

    pub fn send_host_info(&self, host_fps: u16) -> HostResult<()> {
        if !self.is_authenticated() {
            return Ok(());
        }
        self.handle.send_binary_blocking(encode_host_info(host_fps).to_vec())
    }

    pub fn send_monitor_list(&self, current: u8, monitors: &[MonitorRecord]) -> HostResult<()> {
        if !self.is_authenticated() {
            return Ok(());
        }
        let entries: Vec<MonitorEntry> = monitors
            .iter()
            .map(|m| MonitorEntry {
                index: m.index,
                width: m.width,
                height: m.height,
                refresh_hz: m.refresh_hz,
                primary: m.primary,
                name: m.name.clone(),
            })
            .collect();
        self.handle
            .send_binary_blocking(encode_monitor_list(current, &entries))
    }

    /// Chunks and sends one access unit, applying the backpressure
    /// discipline of §4.5.3. Silently skips/truncates rather than erroring
    /// — these are expected steady-state outcomes, not failures.
    pub fn send_video_chunk(
        &self,
        data: &[u8],
        frame_id: u32,
        capture_ts_us: i64,
        encode_us: u32,
        is_key: bool,
    ) -> HostResult<()> {
        if !self.is_authenticated() || data.is_empty() {
            return Ok(());
        }

        let buffered = self.handle.buffered_amount_blocking();
        if matches!(self.backpressure.before_frame(buffered), FrameDecision::SkipWhole) {
            self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            self.set_needs_key();
            self.maybe_disconnect_on_trips();
            return Ok(());
        }

        let chunks = split_into_chunks(data, frame_id, capture_ts_us, encode_us, is_key)?;
        if chunks.len() > MAX_CHUNK_COUNT {
            return Err(HostError::frame_pipeline("send_video_chunk", "too many chunks"));
        }

        for (i, chunk) in chunks.iter().enumerate() {
            if i > 0 {
                let buffered = self.handle.buffered_amount_blocking();
                if matches!(
                    self.backpressure.before_chunk(buffered),
                    FrameDecision::TruncateMidFrame
                ) {
                    self.dropped_frames.fetch_add(1, Ordering::Relaxed);
                    self.set_needs_key();
                    self.maybe_disconnect_on_trips();
                    return Ok(());
                }
            }
            self.handle.send_binary_blocking(chunk.clone())?;
        }
        self.backpressure.clean_frame();
        Ok(())
    }

    fn maybe_disconnect_on_trips(&self) {
        if self.backpressure.consecutive_trips() >= STALE_DISCONNECT_TRIPS {
            self.force_disconnect("sustained backpressure");
        }
    }

    /// Best-effort audio send: never causes a disconnect on failure
    /// (§4.5.4).
    pub fn send_audio(&self, capture_ts_us: i64, samples: u16, payload: &[u8]) {
        if !self.is_authenticated()
            || payload.len() > MAX_AUDIO_PAYLOAD
            || self.backpressure.consecutive_trips() >= AUDIO_BACKPRESSURE_TRIPS_LIMIT
        {
            return;
        }
        let buffered = self.handle.buffered_amount_blocking();
        if buffered > backpressure::BT / 2 {
            return;
        }
        let header = encode_audio_header(capture_ts_us, samples, payload.len() as u16);
        let mut packet = Vec::with_capacity(header.len() + payload.len());
        packet.extend_from_slice(&header);
        packet.extend_from_slice(payload);
        let _ = self.handle.send_binary_blocking(packet);
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }
}

fn now_us() -> i64 {
    use std::time::SystemTime;
    SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ping_stale_threshold_matches_boundary_b4() {
        assert_eq!(PING_STALE_AFTER, Duration::from_millis(3000));
    }
}
