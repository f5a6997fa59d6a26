use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use host::audio::audio_channel;
use host::capture::CaptureStage;
use host::config::HostConfig;
use host::encoder::{codec_options, EncoderStage, NullCodec};
use host::error::classify;
use host::input::{InputRouter, LoggingSink};
use host::monitor::{MonitorList, MonitorRecord};
use host::signaling::{self, SignalingState};
use host::supervisor::{load_or_init_auth, transport_config_from_host_config, Supervisor};
use host::transport::{PeerTransport, TransportCallbacks};

/// Low-latency remote-desktop host: capture, AV1-encode, and ship one
/// monitor over a WebRTC data channel to a single authenticated browser.
#[derive(Parser, Debug)]
#[command(name = "host")]
#[command(about = "Remote desktop host: capture, encode, and stream one monitor over WebRTC")]
struct Args {
    /// Signaling HTTP bind address.
    #[arg(long, default_value = "0.0.0.0:8787")]
    bind: SocketAddr,

    /// Initial capture FPS, before any client FPS negotiation.
    #[arg(long, default_value_t = 60)]
    fps: u32,

    /// Path to the persisted auth credential file.
    #[arg(long, default_value = "./auth.json")]
    auth_file: String,

    /// STUN server URL; may be repeated. Defaults to two public servers.
    #[arg(long = "stun")]
    stun: Vec<String>,

    /// Host UDP port range for ICE candidates, as "lo-hi".
    #[arg(long, default_value = "50000-50100")]
    port_range: String,
}

fn parse_port_range(s: &str) -> Result<(u16, u16)> {
    let (lo, hi) = s
        .split_once('-')
        .context("--port-range must be formatted as <lo>-<hi>")?;
    Ok((lo.parse()?, hi.parse()?))
}

fn main() -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();

    let mut config = HostConfig {
        bind_addr: args.bind,
        initial_fps: args.fps,
        auth_file: args.auth_file.into(),
        ..HostConfig::default()
    };
    if !args.stun.is_empty() {
        config.stun_servers = args.stun;
    }
    config.ice_port_range = parse_port_range(&args.port_range)?;
    config.validate().context("invalid configuration")?;

    let auth = load_or_init_auth(&config).map_err(|e| {
        tracing::error!(error = %e, "cannot start without valid auth.json");
        anyhow::anyhow!("{e}")
    })?;

    let monitors = Arc::new(MonitorList::new());
    monitors.rebuild(enumerate_monitors());

    let source = host::capture::select_backend().context("no capture backend available")?;
    let capture = Arc::new(CaptureStage::new(
        source,
        Arc::clone(&monitors),
        config.pool_size,
        config.initial_fps,
    ));
    capture
        .switch_monitor(0)
        .context("failed to bind the primary monitor")?;
    let (width, height) = capture.native_size();

    let codec = NullCodec::new(width, height, config.initial_fps, codec_options("av1-svt"))
        .context("failed to construct codec backend")?;
    let encoder = EncoderStage::new(codec, width, height, config.initial_fps);

    let transport_config = transport_config_from_host_config(&config);
    let transport = PeerTransport::new(
        transport_config,
        auth,
        Arc::new(|reason: &str| tracing::warn!(reason, "peer disconnected")),
    )
    .context("failed to start peer transport")?;

    let (audio_tx, audio_rx) = audio_channel(32);
    drop(audio_tx); // no loopback-audio capture collaborator is wired up by default

    let first_monitor = monitors.get(0).expect("at least one monitor");
    let input = Arc::new(InputRouter::new(LoggingSink::default(), first_monitor));

    let supervisor = Arc::new(Supervisor::new(
        Arc::clone(&capture),
        encoder,
        Arc::clone(&transport),
        audio_rx,
        Arc::clone(&input),
        Arc::clone(&monitors),
    ));

    // Wired after the Supervisor exists, since the Supervisor itself needs
    // the transport to already be built (§4.8's construction order).
    transport.set_callbacks(TransportCallbacks {
        on_authenticated: Arc::new({
            let supervisor = Arc::clone(&supervisor);
            move || supervisor.on_authenticated()
        }),
        on_disconnected: Arc::new({
            let supervisor = Arc::clone(&supervisor);
            move || supervisor.on_disconnected()
        }),
        on_fps_changed: Arc::new({
            let supervisor = Arc::clone(&supervisor);
            move |fps, mode| supervisor.on_fps_changed(fps, mode)
        }),
        on_monitor_changed: Arc::new({
            let supervisor = Arc::clone(&supervisor);
            move |index| supervisor.on_monitor_changed(index)
        }),
        route_input: Arc::new({
            let input = Arc::clone(&input);
            move |magic, bytes| input.handle_message(magic, bytes)
        }),
        monitors: Arc::clone(&monitors),
        host_fps: Arc::new({
            let capture = Arc::clone(&capture);
            move || capture.current_fps() as u16
        }),
    });

    spawn_worker_threads(Arc::clone(&supervisor));

    let signaling_state = SignalingState {
        transport: Arc::clone(&transport),
    };
    let app = signaling::router(signaling_state);

    let runtime_handle = transport.runtime_handle();
    let bind_addr = config.bind_addr;
    runtime_handle.block_on(async move {
        let listener = tokio::net::TcpListener::bind(bind_addr)
            .await
            .context("failed to bind signaling HTTP port")?;
        tracing::info!(%bind_addr, "signaling server listening");
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("signaling server error")
    })?;

    supervisor.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

fn spawn_worker_threads<C, S>(supervisor: Arc<Supervisor<C, S>>)
where
    C: host::encoder::CodecBackend + 'static,
    S: host::input::InjectSink + 'static,
{
    let encoder_supervisor = Arc::clone(&supervisor);
    std::thread::Builder::new()
        .name("encoder-stage".into())
        .spawn(move || {
            while encoder_supervisor.is_running() {
                encoder_supervisor.encoder_tick();
            }
        })
        .expect("spawn encoder-stage thread");

    let audio_supervisor = Arc::clone(&supervisor);
    std::thread::Builder::new()
        .name("audio-stage".into())
        .spawn(move || {
            while audio_supervisor.is_running() {
                audio_supervisor.audio_tick();
            }
        })
        .expect("spawn audio-stage thread");

    let stats_supervisor = Arc::clone(&supervisor);
    std::thread::Builder::new()
        .name("stats".into())
        .spawn(move || {
            while stats_supervisor.is_running() {
                std::thread::sleep(Duration::from_secs(1));
                let snapshot = stats_supervisor.stats_tick();
                tracing::info!(
                    dropped_late = snapshot.frames_dropped_late,
                    dropped_transport = snapshot.frames_dropped_transport,
                    "stats"
                );
            }
        })
        .expect("spawn stats thread");
}

/// Enumerates real displays via `scrap` when compiled in; otherwise falls
/// back to a single placeholder record so the monitor list is never empty.
fn enumerate_monitors() -> Vec<MonitorRecord> {
    #[cfg(feature = "capture-scrap")]
    {
        if let Ok(displays) = scrap::Display::all() {
            let records: Vec<MonitorRecord> = displays
                .iter()
                .enumerate()
                .map(|(i, d)| MonitorRecord {
                    handle: i as u64,
                    index: i as u8,
                    width: d.width() as u16,
                    height: d.height() as u16,
                    refresh_hz: 60,
                    primary: d.is_primary(),
                    name: format!("display-{i}"),
                })
                .collect();
            if !records.is_empty() {
                return records;
            }
        }
    }

    vec![MonitorRecord {
        handle: 0,
        index: 0,
        width: 1920,
        height: 1080,
        refresh_hz: 60,
        primary: true,
        name: "primary".to_string(),
    }]
}

#[allow(dead_code)]
fn exit_code_for(error: &host::error::HostError) -> i32 {
    if classify::is_fatal(error) {
        1
    } else {
        0
    }
}
