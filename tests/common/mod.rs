//! Shared test doubles for the integration scenarios in `tests/`.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use host::capture::{RawFrame, TextureSource};
use host::encoder::CodecBackend;
use host::error::HostResult;
use host::input::InjectSink;
use host::monitor::{MonitorList, MonitorRecord};
use host::supervisor::Supervisor;
use host::transport::peer::PeerTransportConfig;
use host::transport::{PeerTransport, TransportCallbacks};

/// A `TextureSource` double that replays a fixed queue of frames instead of
/// touching real hardware, mirroring `CaptureStage`'s own unit-test fixture.
pub struct QueuedSource {
    size: (u16, u16),
    frames: Mutex<Vec<RawFrame>>,
}

impl QueuedSource {
    pub fn new(size: (u16, u16), frames: Vec<RawFrame>) -> Self {
        Self {
            size,
            frames: Mutex::new(frames),
        }
    }
}

impl TextureSource for QueuedSource {
    fn bind_monitor(&mut self, _monitor_handle: u64) -> HostResult<(u16, u16)> {
        Ok(self.size)
    }

    fn native_size(&self) -> (u16, u16) {
        self.size
    }

    fn native_refresh_hz(&self) -> Option<u16> {
        Some(60)
    }

    fn next_frame(&mut self, _deadline: Instant) -> HostResult<Option<RawFrame>> {
        Ok(self.frames.lock().unwrap().pop())
    }
}

pub fn monitor(index: u8, primary: bool) -> MonitorRecord {
    MonitorRecord {
        handle: index as u64,
        index,
        width: 1920,
        height: 1080,
        refresh_hz: 60,
        primary,
        name: format!("monitor-{index}"),
    }
}

pub fn raw_frame(capture_ts_us: i64) -> RawFrame {
    RawFrame {
        data: vec![0u8; 64],
        width: 1920,
        height: 1080,
        capture_ts_us,
    }
}

/// A `PeerTransport` with no live peer — enough to exercise everything that
/// doesn't require an active data channel (`force_disconnect`,
/// `set_callbacks`, the control-message handlers' callback side effects).
pub fn test_peer_transport() -> Arc<PeerTransport> {
    let auth = host::config::AuthRecord::new("alice", "123456").unwrap();
    PeerTransport::new(
        PeerTransportConfig {
            stun_servers: Vec::new(),
            ice_port_range: (40000, 40010),
        },
        auth,
        Arc::new(|_: &str| {}),
    )
    .expect("construct test transport")
}

/// Builds the same `TransportCallbacks` wiring `main.rs` installs, so
/// integration tests drive the real `Supervisor`/`InputRouter` methods
/// rather than reimplementing their logic.
pub fn wire_callbacks<C, S>(
    supervisor: &Arc<Supervisor<C, S>>,
    input: &Arc<host::input::InputRouter<S>>,
    monitors: &Arc<MonitorList>,
) -> TransportCallbacks
where
    C: CodecBackend + 'static,
    S: InjectSink + 'static,
{
    TransportCallbacks {
        on_authenticated: Arc::new({
            let supervisor = Arc::clone(supervisor);
            move || supervisor.on_authenticated()
        }),
        on_disconnected: Arc::new({
            let supervisor = Arc::clone(supervisor);
            move || supervisor.on_disconnected()
        }),
        on_fps_changed: Arc::new({
            let supervisor = Arc::clone(supervisor);
            move |fps, mode| supervisor.on_fps_changed(fps, mode)
        }),
        on_monitor_changed: Arc::new({
            let supervisor = Arc::clone(supervisor);
            move |index| supervisor.on_monitor_changed(index)
        }),
        route_input: Arc::new({
            let input = Arc::clone(input);
            move |magic, bytes| input.handle_message(magic, bytes)
        }),
        monitors: Arc::clone(monitors),
        host_fps: Arc::new({
            let supervisor = Arc::clone(supervisor);
            move || supervisor.capture.current_fps() as u16
        }),
    }
}

pub fn mouse_move_bytes(nx: f32, ny: f32) -> Vec<u8> {
    use host::transport::wire::MSG_MOUSE_MOVE;
    let mut buf = Vec::with_capacity(12);
    buf.extend_from_slice(&MSG_MOUSE_MOVE.to_le_bytes());
    buf.extend_from_slice(&nx.to_le_bytes());
    buf.extend_from_slice(&ny.to_le_bytes());
    buf
}

pub fn key_event_bytes(code: u32, scan: u32, down: bool, mods: u8) -> Vec<u8> {
    use host::transport::wire::MSG_KEY;
    let mut buf = Vec::with_capacity(14);
    buf.extend_from_slice(&MSG_KEY.to_le_bytes());
    buf.extend_from_slice(&code.to_le_bytes());
    buf.extend_from_slice(&scan.to_le_bytes());
    buf.push(down as u8);
    buf.push(mods);
    buf
}
