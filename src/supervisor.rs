//! # Supervisor
//!
//! Wires every stage together and runs the three worker threads named in
//! SPEC_FULL §4.8/§5: the encoder-stage thread, the audio thread, and the
//! stats thread. Construction order follows §4.8: Frame Slot → Capture →
//! Encoder → Peer Transport → Audio → Input.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::audio::{AudioReceiver, AudioStage};
use crate::capture::{CaptureStage, TextureSource};
use crate::config::{AuthRecord, HostConfig};
use crate::encoder::{CodecBackend, EncoderStage};
use crate::input::{InjectSink, InputRouter};
use crate::monitor::MonitorList;
use crate::transport::peer::PeerTransportConfig;
use crate::transport::PeerTransport;

const ENCODER_GPU_WAIT: Duration = Duration::from_millis(5);
const WIGGLE_DELAY: Duration = Duration::from_millis(100);

/// Per-second counters the stats thread aggregates and logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatsSnapshot {
    pub frames_published: u64,
    pub frames_dropped_late: u64,
    pub frames_dropped_transport: u64,
}

pub struct Supervisor<C: CodecBackend, S: InjectSink> {
    pub capture: Arc<CaptureStage>,
    pub encoder: Mutex<EncoderStage<C>>,
    pub transport: Arc<PeerTransport>,
    pub audio: AudioStage,
    pub input: Arc<InputRouter<S>>,
    pub monitors: Arc<MonitorList>,
    running: Arc<AtomicBool>,
}

impl<C: CodecBackend, S: InjectSink> Supervisor<C, S> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        capture: Arc<CaptureStage>,
        encoder: EncoderStage<C>,
        transport: Arc<PeerTransport>,
        audio_receiver: AudioReceiver,
        input: Arc<InputRouter<S>>,
        monitors: Arc<MonitorList>,
    ) -> Self {
        Self {
            capture,
            encoder: Mutex::new(encoder),
            transport,
            audio: AudioStage::new(audio_receiver),
            input,
            monitors,
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// One iteration of the encoder-stage thread: pop a frame, wait on GPU
    /// sync up to 5 ms, flush-on-wake if coming out of idle, encode, send,
    /// release the pool slot.
    pub fn encoder_tick(&self) {
        let Some(frame) = self.capture.frame_slot().pop(Duration::from_millis(50)) else {
            return;
        };

        let deadline = Instant::now() + ENCODER_GPU_WAIT;
        let _ = deadline; // GPU fence wait is modeled inside CaptureStage's gpu_sync ticket today.

        let data = self.capture.read_pool_buffer(frame.pool_idx);
        let force_key = self.transport.take_needs_key();

        let mut encoder = self.encoder.lock().unwrap();
        encoder.set_streaming_ready(self.transport.is_authenticated());
        let access_unit = encoder.encode(&data, frame.capture_ts_us, force_key);
        drop(encoder);

        self.capture.release_pool_buffer(frame.pool_idx);

        match access_unit {
            Ok(Some(unit)) => {
                let _ = self.transport.send_video_chunk(
                    &unit.data,
                    unit.frame_id,
                    unit.capture_ts_us,
                    unit.encode_us,
                    unit.is_key,
                );
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, "encode failed for this frame");
            }
        }
    }

    pub fn audio_tick(&self) {
        self.audio.pump(&self.transport, Duration::from_millis(50));
    }

    pub fn stats_tick(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_published: 0,
            frames_dropped_late: self.capture.dropped_late_frames(),
            frames_dropped_transport: self.transport.dropped_frames(),
        }
    }

    /// Called when the transport reports an `FPS_SET`; mode=1 coerces to
    /// the bound monitor's native refresh rate instead of the client's
    /// request. Returns the fps actually applied, for the transport to ack.
    pub fn on_fps_changed(&self, requested_fps: u32, mode: u8) -> u32 {
        let target = if mode == 1 {
            self.capture
                .native_refresh_hz()
                .map(|hz| hz as u32)
                .unwrap_or(requested_fps)
        } else {
            requested_fps
        };
        let _ = self.capture.set_fps(target);
        if self.capture.state() != crate::capture::CaptureState::Running {
            let _ = self.capture.start();
        }
        target
    }

    /// Called when the transport reports a monitor-switch request. Returns
    /// whether the switch succeeded, so the transport knows whether to
    /// re-send the monitor list and host info.
    pub fn on_monitor_changed(&self, index: u8) -> bool {
        if self.capture.switch_monitor(index).is_ok() {
            if let Some(monitor) = self.monitors.get(index) {
                self.input.rebind_monitor(monitor);
            }
            self.schedule_wiggle();
            true
        } else {
            false
        }
    }

    pub fn on_authenticated(&self) {
        self.schedule_wiggle();
    }

    pub fn on_disconnected(&self) {
        self.capture.pause();
    }

    fn schedule_wiggle(&self) {
        let input = Arc::clone(&self.input);
        std::thread::spawn(move || {
            std::thread::sleep(WIGGLE_DELAY);
            input.wiggle_center();
        });
    }
}

pub fn transport_config_from_host_config(config: &HostConfig) -> PeerTransportConfig {
    PeerTransportConfig {
        stun_servers: config.stun_servers.clone(),
        ice_port_range: config.ice_port_range,
    }
}

pub fn load_or_init_auth(config: &HostConfig) -> crate::error::HostResult<AuthRecord> {
    match AuthRecord::load(&config.auth_file) {
        Ok(record) => Ok(record),
        Err(_) => {
            tracing::warn!(
                path = %config.auth_file.display(),
                "no auth.json found; this host will reject all connections until one is created"
            );
            Err(crate::error::HostError::config(
                "auth_file",
                config.auth_file.display().to_string(),
                "missing or invalid auth.json",
            ))
        }
    }
}
