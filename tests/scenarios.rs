//! End-to-end scenarios spanning multiple modules: the connection
//! lifecycles from the design (cold connect, bad PIN, FPS negotiation,
//! mid-stream keyframe request, backpressure disconnect, monitor switch,
//! input forwarding). Where a live WebRTC data channel isn't reachable
//! from a test process, these drive the same `PeerTransport`/`Supervisor`
//! wiring production code installs — `TransportCallbacks` built exactly
//! as `main.rs` builds them — rather than reimplementing the logic inline.

mod common;

use std::sync::Arc;
use std::time::Duration;

use host::audio::audio_channel;
use host::capture::CaptureStage;
use host::config::AuthRecord;
use host::encoder::{codec_options, EncoderStage, NullCodec};
use host::input::{InputRouter, LoggingSink};
use host::monitor::MonitorList;
use host::supervisor::Supervisor;
use host::transport::auth::{self, AuthOutcome};
use host::transport::session::PeerSession;
use host::transport::wire::AuthRequest;

use common::{key_event_bytes, monitor, mouse_move_bytes, raw_frame, test_peer_transport, wire_callbacks, QueuedSource};

fn test_supervisor(
    monitors: Arc<MonitorList>,
    fps: u32,
) -> (
    Arc<Supervisor<NullCodec, LoggingSink>>,
    Arc<CaptureStage>,
    Arc<InputRouter<LoggingSink>>,
) {
    let source = Box::new(QueuedSource::new((1920, 1080), vec![raw_frame(0)]));
    let capture = Arc::new(CaptureStage::new(source, Arc::clone(&monitors), 8, fps));
    let codec = NullCodec::new(1920, 1080, fps, codec_options("av1-svt")).unwrap();
    let encoder = EncoderStage::new(codec, 1920, 1080, fps);
    let transport = test_peer_transport();
    let (_audio_tx, audio_rx) = audio_channel(8);
    let first = monitors.get(0).unwrap();
    let input = Arc::new(InputRouter::new(LoggingSink::default(), first));
    let supervisor = Arc::new(Supervisor::new(
        Arc::clone(&capture),
        encoder,
        transport,
        audio_rx,
        Arc::clone(&input),
        Arc::clone(&monitors),
    ));
    (supervisor, capture, input)
}

#[test]
fn cold_connect_auth_success_schedules_wiggle_via_supervisor() {
    let record = AuthRecord::new("alice", "123456").unwrap();
    let session = PeerSession::new();
    session.on_data_channel_open();
    assert!(session.is_connected());
    assert!(!session.is_authenticated());

    let request = AuthRequest {
        username: "alice".to_string(),
        pin: "123456".to_string(),
    };
    match auth::authenticate(&record, &request) {
        AuthOutcome::Accepted => session.on_authenticated(),
        AuthOutcome::Rejected { .. } => panic!("expected valid credentials to be accepted"),
    }
    assert!(session.is_authenticated());

    // The Supervisor's `on_authenticated` is the real hook `PeerTransport`
    // invokes post-auth (§4.8); confirm it actually nudges the cursor.
    let monitors = Arc::new(MonitorList::new());
    monitors.rebuild(vec![monitor(0, true)]);
    let (supervisor, _capture, input) = test_supervisor(monitors, 60);
    supervisor.on_authenticated();
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(input.recorded_events().len(), 3);
}

#[test]
fn bad_pin_is_rejected_and_session_never_authenticates() {
    let record = AuthRecord::new("alice", "123456").unwrap();
    let session = PeerSession::new();
    session.on_data_channel_open();

    let request = AuthRequest {
        username: "alice".to_string(),
        pin: "000000".to_string(),
    };
    match auth::authenticate(&record, &request) {
        AuthOutcome::Rejected { reason } => assert_eq!(reason, "Invalid credentials"),
        AuthOutcome::Accepted => panic!("wrong PIN must not be accepted"),
    }
    assert!(!session.is_authenticated());
    assert!(!auth::allowed_before_auth(host::transport::wire::MSG_MOUSE_MOVE));
}

#[test]
fn fps_negotiation_wires_to_supervisor_and_coerces_mode1() {
    let monitors = Arc::new(MonitorList::new());
    monitors.rebuild(vec![monitor(0, true)]);
    let (supervisor, capture, input) = test_supervisor(Arc::clone(&monitors), 60);
    let callbacks = wire_callbacks(&supervisor, &input, &monitors);

    assert_eq!(capture.current_fps(), 60);

    // mode=0: the requested fps is honored verbatim.
    let confirmed = (callbacks.on_fps_changed)(30, 0);
    assert_eq!(confirmed, 30);
    assert_eq!(capture.current_fps(), 30);
    assert_eq!(capture.state(), host::capture::CaptureState::Running);

    // mode=1: the client's requested fps is ignored; the host's own
    // refresh rate (60, per `QueuedSource::native_refresh_hz`) wins.
    let confirmed = (callbacks.on_fps_changed)(144, 1);
    assert_eq!(confirmed, 60);
    assert_eq!(capture.current_fps(), 60);
}

#[test]
fn keyframe_request_forces_key_on_the_next_encode() {
    let codec = NullCodec::new(1920, 1080, 60, codec_options("av1-svt")).unwrap();
    let mut encoder = EncoderStage::new(codec, 1920, 1080, 60);
    encoder.set_streaming_ready(true);

    let first = encoder.encode(&[0u8; 32], 0, false).unwrap().unwrap();
    assert!(first.is_key);

    let delta = encoder.encode(&[0u8; 32], 1, false).unwrap().unwrap();
    assert!(!delta.is_key);

    let session = PeerSession::new();
    session.set_needs_key();
    let forced = session.take_needs_key();
    assert!(forced);

    let keyframe = encoder.encode(&[0u8; 32], 2, forced).unwrap().unwrap();
    assert!(keyframe.is_key);
    assert!(!session.take_needs_key(), "needs_key must be consumed exactly once");
}

#[test]
fn forced_disconnect_pauses_capture_via_supervisor_wiring() {
    let monitors = Arc::new(MonitorList::new());
    monitors.rebuild(vec![monitor(0, true)]);
    let (supervisor, capture, input) = test_supervisor(Arc::clone(&monitors), 60);
    let transport = test_peer_transport();
    transport.set_callbacks(wire_callbacks(&supervisor, &input, &monitors));

    capture.start().unwrap();
    assert_eq!(capture.state(), host::capture::CaptureState::Running);

    // Drives the exact method `check_liveness`/`maybe_disconnect_on_trips`
    // call once ten consecutive backpressure trips land — confirming
    // §4.8's "Transport's disconnect -> Capture.pause" actually fires.
    transport.force_disconnect("sustained backpressure");
    assert_eq!(capture.state(), host::capture::CaptureState::Paused);
}

#[test]
fn monitor_switch_wires_through_supervisor_to_capture_and_input() {
    let monitors = Arc::new(MonitorList::new());
    monitors.rebuild(vec![monitor(0, true), monitor(1, false)]);
    let (supervisor, capture, input) = test_supervisor(Arc::clone(&monitors), 60);
    let callbacks = wire_callbacks(&supervisor, &input, &monitors);

    assert!((callbacks.on_monitor_changed)(1));
    assert_eq!(capture.native_size(), (1920, 1080));

    // The router was rebound to monitor 1 as a side effect of the switch;
    // confirm by dispatching a move and checking the sink recorded it.
    input.handle_message(host::transport::wire::MSG_MOUSE_MOVE, &mouse_move_bytes(1.0, 1.0)).unwrap();
    assert_eq!(input.recorded_events().len(), 1);

    assert!(!(callbacks.on_monitor_changed)(9), "unknown monitor index must not report success");
}

#[test]
fn mouse_and_key_messages_are_forwarded_to_input_router() {
    let monitors = Arc::new(MonitorList::new());
    monitors.rebuild(vec![monitor(0, true)]);
    let (supervisor, _capture, input) = test_supervisor(Arc::clone(&monitors), 60);
    let callbacks = wire_callbacks(&supervisor, &input, &monitors);

    (callbacks.route_input)(host::transport::wire::MSG_MOUSE_MOVE, &mouse_move_bytes(0.25, 0.75)).unwrap();
    (callbacks.route_input)(host::transport::wire::MSG_KEY, &key_event_bytes(0x41, 30, true, 0)).unwrap();

    assert_eq!(input.recorded_events().len(), 2);
}
