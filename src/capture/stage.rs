//! # Capture Stage
//!
//! Binds to one monitor, paces incoming frames to a target FPS, and hands
//! them to the Frame Slot. Frame pacing drops late samples and re-aligns
//! in whole intervals rather than drifting (SPEC_FULL §4.3).

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::core::buffer_pool::BufferPool;
use crate::core::{Frame, FrameSlot, GpuSync, GpuSyncBackend};
use crate::error::{HostError, HostResult};
use crate::monitor::MonitorList;

use super::source::{RawFrame, TextureSource};

const MIN_FPS: u32 = 1;
const MAX_FPS: u32 = 240;

/// Called on the supervisor's behalf whenever a monitor switch changes the
/// captured resolution, so the Encoder Stage can be rebuilt.
pub type ResolutionChangeCallback = Box<dyn Fn(u16, u16) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Stopped,
    Running,
    Paused,
}

struct PacingState {
    next_frame_time_us: i64,
    have_first_sample: bool,
}

pub struct CaptureStage {
    source: Mutex<Box<dyn TextureSource>>,
    monitors: Arc<MonitorList>,
    current_monitor: AtomicU32,
    frame_slot: Arc<FrameSlot>,
    pool: Vec<Mutex<Vec<u8>>>,
    pool_buf_size: AtomicU32,
    gpu_sync: GpuSyncBackend,
    target_fps: AtomicU32,
    native_size: Mutex<(u16, u16)>,
    state: Mutex<CaptureState>,
    pacing: Mutex<PacingState>,
    switch_lock: Mutex<()>,
    on_resolution_change: Mutex<Option<ResolutionChangeCallback>>,
    dropped_late: AtomicU64,
}

impl CaptureStage {
    pub fn new(
        source: Box<dyn TextureSource>,
        monitors: Arc<MonitorList>,
        pool_size: usize,
        initial_fps: u32,
    ) -> Self {
        let pool = (0..pool_size).map(|_| Mutex::new(Vec::new())).collect();
        Self {
            source: Mutex::new(source),
            monitors,
            current_monitor: AtomicU32::new(0),
            frame_slot: Arc::new(FrameSlot::new()),
            pool,
            pool_buf_size: AtomicU32::new(0),
            gpu_sync: GpuSyncBackend::Fence(crate::core::gpu_sync::FenceSync::new()),
            target_fps: AtomicU32::new(initial_fps.clamp(MIN_FPS, MAX_FPS)),
            native_size: Mutex::new((0, 0)),
            state: Mutex::new(CaptureState::Stopped),
            pacing: Mutex::new(PacingState {
                next_frame_time_us: 0,
                have_first_sample: true,
            }),
            switch_lock: Mutex::new(()),
            on_resolution_change: Mutex::new(None),
            dropped_late: AtomicU64::new(0),
        }
    }

    pub fn frame_slot(&self) -> Arc<FrameSlot> {
        Arc::clone(&self.frame_slot)
    }

    pub fn set_resolution_change_callback(&self, callback: ResolutionChangeCallback) {
        *self.on_resolution_change.lock().unwrap() = Some(callback);
    }

    pub fn start(&self) -> HostResult<()> {
        let mut state = self.state.lock().unwrap();
        *state = CaptureState::Running;
        Ok(())
    }

    pub fn pause(&self) {
        let mut state = self.state.lock().unwrap();
        *state = CaptureState::Paused;
    }

    pub fn state(&self) -> CaptureState {
        *self.state.lock().unwrap()
    }

    pub fn current_fps(&self) -> u32 {
        self.target_fps.load(Ordering::Relaxed)
    }

    pub fn native_size(&self) -> (u16, u16) {
        *self.native_size.lock().unwrap()
    }

    /// The bound monitor's native refresh rate, used to coerce an
    /// `FPS_SET` mode=1 request to the host's own refresh rate (§4.5.5).
    pub fn native_refresh_hz(&self) -> Option<u16> {
        self.source.lock().unwrap().native_refresh_hz()
    }

    /// Sets the target capture FPS; out-of-range values are rejected per §4.3.
    pub fn set_fps(&self, fps: u32) -> HostResult<()> {
        if !(MIN_FPS..=MAX_FPS).contains(&fps) {
            return Err(HostError::validation(
                "fps",
                "must be in [1, 240]",
                fps.to_string(),
            ));
        }
        self.target_fps.store(fps, Ordering::Relaxed);
        let mut pacing = self.pacing.lock().unwrap();
        pacing.have_first_sample = true;
        Ok(())
    }

    /// Switches the captured monitor. Serialized with `switch_lock`; on
    /// failure the previous capture session is considered lost per §4.3.
    pub fn switch_monitor(&self, index: u8) -> HostResult<()> {
        let _guard = self.switch_lock.lock().unwrap();
        let monitor = self
            .monitors
            .get(index)
            .ok_or_else(|| HostError::state("capture", "switch_monitor", "unknown monitor index"))?;

        let was_running = matches!(self.state(), CaptureState::Running);

        let mut source = self.source.lock().unwrap();
        let (width, height) = source.bind_monitor(monitor.handle)?;
        drop(source);

        *self.native_size.lock().unwrap() = (width, height);
        self.current_monitor.store(index as u32, Ordering::Relaxed);
        self.frame_slot.reset();
        {
            let mut pacing = self.pacing.lock().unwrap();
            pacing.have_first_sample = true;
        }

        if let Some(callback) = self.on_resolution_change.lock().unwrap().as_ref() {
            callback(width, height);
        }

        if was_running {
            self.start()?;
        } else {
            self.pause();
        }
        Ok(())
    }

    /// Runs one capture iteration: pulls a frame from the source (blocking
    /// up to `deadline`), applies pacing, and pushes into the Frame Slot.
    /// Returns `Ok(true)` if a frame was published.
    pub fn pump(&self, deadline: Instant) -> HostResult<bool> {
        if self.state() != CaptureState::Running {
            return Ok(false);
        }
        let raw = {
            let mut source = self.source.lock().unwrap();
            source.next_frame(deadline)?
        };
        let Some(raw) = raw else {
            return Ok(false);
        };
        self.on_frame_arrived(raw)
    }

    fn on_frame_arrived(&self, raw: RawFrame) -> HostResult<bool> {
        let fps = self.target_fps.load(Ordering::Relaxed).max(1) as i64;
        let interval_us = 1_000_000 / fps;
        let now = raw.capture_ts_us;

        let mut pacing = self.pacing.lock().unwrap();
        if pacing.have_first_sample {
            pacing.next_frame_time_us = now + interval_us;
            pacing.have_first_sample = false;
        } else {
            if now < pacing.next_frame_time_us {
                self.dropped_late.fetch_add(1, Ordering::Relaxed);
                return Ok(false);
            }
            while pacing.next_frame_time_us + interval_us <= now {
                pacing.next_frame_time_us += interval_us;
            }
            pacing.next_frame_time_us += interval_us;
        }
        drop(pacing);

        let Some(pool_idx) = self.frame_slot.find_available_texture(self.pool.len()) else {
            return Ok(false);
        };
        {
            let mut buf = self.pool[pool_idx].lock().unwrap();
            buf.clear();
            buf.extend_from_slice(&raw.data);
        }
        self.pool_buf_size
            .store(raw.data.len() as u32, Ordering::Relaxed);

        let ticket = self.gpu_sync.signal();
        self.frame_slot.push(Frame {
            pool_idx,
            capture_ts_us: raw.capture_ts_us,
            ticket,
        });
        Ok(true)
    }

    pub fn read_pool_buffer(&self, pool_idx: usize) -> Vec<u8> {
        self.pool[pool_idx].lock().unwrap().clone()
    }

    pub fn release_pool_buffer(&self, pool_idx: usize) {
        self.frame_slot.mark_released(pool_idx);
    }

    pub fn dropped_late_frames(&self) -> u64 {
        self.dropped_late.load(Ordering::Relaxed)
    }
}

/// Shared texture staging, kept separate from the pool mutexes above for
/// backends that want a single large scratch buffer instead of N small
/// ones (e.g. a BGRA conversion scratch). Not required by every backend.
pub fn shared_scratch_pool(buffer_size: usize) -> BufferPool {
    BufferPool::new(buffer_size, 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct FixedSource {
        size: (u16, u16),
        frames: StdMutex<Vec<RawFrame>>,
    }

    impl TextureSource for FixedSource {
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

    fn monitor_list() -> Arc<MonitorList> {
        let list = Arc::new(MonitorList::new());
        list.rebuild(vec![crate::monitor::MonitorRecord {
            handle: 1,
            index: 0,
            width: 1920,
            height: 1080,
            refresh_hz: 60,
            primary: true,
            name: "primary".into(),
        }]);
        list
    }

    #[test]
    fn first_frame_always_publishes() {
        let source = Box::new(FixedSource {
            size: (1920, 1080),
            frames: StdMutex::new(vec![RawFrame {
                data: vec![1, 2, 3],
                width: 1920,
                height: 1080,
                capture_ts_us: 1_000_000,
            }]),
        });
        let stage = CaptureStage::new(source, monitor_list(), 8, 60);
        stage.start().unwrap();
        let published = stage.on_frame_arrived(RawFrame {
            data: vec![9, 9, 9],
            width: 1920,
            height: 1080,
            capture_ts_us: 1_000_000,
        });
        assert!(published.unwrap());
    }

    #[test]
    fn late_frame_is_dropped_without_drift() {
        let source = Box::new(FixedSource {
            size: (1920, 1080),
            frames: StdMutex::new(Vec::new()),
        });
        let stage = CaptureStage::new(source, monitor_list(), 8, 60);
        stage.start().unwrap();
        stage
            .on_frame_arrived(RawFrame {
                data: vec![0; 4],
                width: 1920,
                height: 1080,
                capture_ts_us: 0,
            })
            .unwrap();
        let dropped = stage
            .on_frame_arrived(RawFrame {
                data: vec![0; 4],
                width: 1920,
                height: 1080,
                capture_ts_us: 1,
            })
            .unwrap();
        assert!(!dropped);
        assert_eq!(stage.dropped_late_frames(), 1);
    }

    #[test]
    fn set_fps_rejects_out_of_range() {
        let source = Box::new(FixedSource {
            size: (1920, 1080),
            frames: StdMutex::new(Vec::new()),
        });
        let stage = CaptureStage::new(source, monitor_list(), 8, 60);
        assert!(stage.set_fps(0).is_err());
        assert!(stage.set_fps(241).is_err());
        assert!(stage.set_fps(120).is_ok());
        assert_eq!(stage.current_fps(), 120);
    }

    #[test]
    fn switch_monitor_rebinds_and_resets_slot() {
        let source = Box::new(FixedSource {
            size: (1920, 1080),
            frames: StdMutex::new(Vec::new()),
        });
        let stage = CaptureStage::new(source, monitor_list(), 8, 60);
        stage.switch_monitor(0).unwrap();
        assert_eq!(stage.native_size(), (1920, 1080));
        assert!(stage.switch_monitor(9).is_err());
    }
}
