//! # Input Router
//!
//! Normalized `[0,1]` mouse coordinates are clamped, mapped to the bound
//! monitor's pixel rectangle, then to the virtual desktop's absolute
//! `[0, 65535]` coordinate system (SPEC_FULL §4.6). Key codes are
//! translated through `keymap::translate`. Injection into the OS proper is
//! out of scope; `InjectSink` is the trait boundary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::{HostError, HostResult};
use crate::monitor::MonitorRecord;
use crate::transport::wire::{KeyEvent, MouseButton, MouseMove, MouseWheel};

use super::keymap;

/// Platform-specific input injection boundary. A `LoggingSink` ships as
/// the default/test implementation.
pub trait InjectSink: Send {
    fn move_abs(&mut self, x: u16, y: u16);
    fn button(&mut self, button: u8, down: bool);
    fn wheel(&mut self, dx: f32, dy: f32);
    fn key(&mut self, vk: u16, down: bool, extended: bool);
}

/// Records dispatched primitives instead of touching the windowing system.
#[derive(Debug, Default)]
pub struct LoggingSink {
    pub events: Vec<String>,
}

impl InjectSink for LoggingSink {
    fn move_abs(&mut self, x: u16, y: u16) {
        self.events.push(format!("move_abs({x},{y})"));
    }
    fn button(&mut self, button: u8, down: bool) {
        self.events.push(format!("button({button},{down})"));
    }
    fn wheel(&mut self, dx: f32, dy: f32) {
        self.events.push(format!("wheel({dx},{dy})"));
    }
    fn key(&mut self, vk: u16, down: bool, extended: bool) {
        self.events.push(format!("key({vk},{down},{extended})"));
    }
}

const VIRTUAL_DESKTOP_MAX: u32 = 65535;
const VALID_BUTTONS: &[u8] = &[0, 1, 2, 3, 4];

pub struct InputRouter<S: InjectSink> {
    sink: Mutex<S>,
    bound_monitor: Mutex<MonitorRecord>,
    enabled: AtomicBool,
}

impl<S: InjectSink> InputRouter<S> {
    pub fn new(sink: S, bound_monitor: MonitorRecord) -> Self {
        Self {
            sink: Mutex::new(sink),
            bound_monitor: Mutex::new(bound_monitor),
            enabled: AtomicBool::new(true),
        }
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    pub fn rebind_monitor(&self, monitor: MonitorRecord) {
        *self.bound_monitor.lock().unwrap() = monitor;
    }

    /// Maps a clamped `[0,1]` coordinate through the bound monitor's pixel
    /// rectangle into the virtual desktop's absolute `[0, 65535]` space.
    fn map_to_absolute(&self, nx: f32, ny: f32) -> (u16, u16) {
        let nx = nx.clamp(0.0, 1.0);
        let ny = ny.clamp(0.0, 1.0);
        let monitor = self.bound_monitor.lock().unwrap();
        let px = nx * monitor.width as f32;
        let py = ny * monitor.height as f32;
        let desktop_w = monitor.width.max(1) as f32;
        let desktop_h = monitor.height.max(1) as f32;
        let ax = ((px / desktop_w) * VIRTUAL_DESKTOP_MAX as f32).round() as u16;
        let ay = ((py / desktop_h) * VIRTUAL_DESKTOP_MAX as f32).round() as u16;
        (ax, ay)
    }

    pub fn mouse_move(&self, nx: f32, ny: f32) {
        if !self.is_enabled() {
            return;
        }
        let (x, y) = self.map_to_absolute(nx, ny);
        self.sink.lock().unwrap().move_abs(x, y);
    }

    pub fn mouse_button(&self, button: u8, down: bool) -> HostResult<()> {
        if !self.is_enabled() {
            return Ok(());
        }
        if !VALID_BUTTONS.contains(&button) {
            return Err(HostError::input_router(format!("unknown button index {button}")));
        }
        self.sink.lock().unwrap().button(button, down);
        Ok(())
    }

    pub fn mouse_wheel(&self, dx: f32, dy: f32) {
        if !self.is_enabled() {
            return;
        }
        self.sink.lock().unwrap().wheel(dx, dy);
    }

    pub fn key(&self, code: u32, _scan: u32, down: bool, _mods: u8) {
        if !self.is_enabled() {
            return;
        }
        let Some(vk) = keymap::translate(code) else {
            tracing::debug!(code, "unknown key code dropped");
            return;
        };
        self.sink.lock().unwrap().key(vk.vk, down, vk.extended);
    }

    /// Dispatches three absolute moves to nudge the cursor, used after
    /// (re)authentication or a monitor switch to coax the encoder into
    /// emitting a keyframe when content is otherwise static.
    pub fn wiggle_center(&self) {
        self.mouse_move(0.5, 0.5);
        self.mouse_move(0.501, 0.5);
        self.mouse_move(0.5, 0.5);
    }

    pub fn handle_message(&self, magic: u32, bytes: &[u8]) -> HostResult<()> {
        use crate::transport::wire;
        match magic {
            wire::MSG_MOUSE_MOVE => {
                let m = MouseMove::decode(bytes)?;
                self.mouse_move(m.nx, m.ny);
                Ok(())
            }
            wire::MSG_MOUSE_BTN => {
                let m = MouseButton::decode(bytes)?;
                self.mouse_button(m.button, m.down)
            }
            wire::MSG_MOUSE_WHEEL => {
                let m = MouseWheel::decode(bytes)?;
                self.mouse_wheel(m.dx, m.dy);
                Ok(())
            }
            wire::MSG_KEY => {
                let k = KeyEvent::decode(bytes)?;
                self.key(k.code, k.scan, k.down, k.mods);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl InputRouter<LoggingSink> {
    /// Recorded events from the logging sink, for tests that drive the
    /// router through `handle_message` rather than the sink directly.
    pub fn recorded_events(&self) -> Vec<String> {
        self.sink.lock().unwrap().events.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> MonitorRecord {
        MonitorRecord {
            handle: 0,
            index: 0,
            width: 1920,
            height: 1080,
            refresh_hz: 60,
            primary: true,
            name: "primary".into(),
        }
    }

    #[test]
    fn center_maps_to_desktop_center() {
        let router = InputRouter::new(LoggingSink::default(), monitor());
        router.mouse_move(0.5, 0.5);
        let sink = router.sink.lock().unwrap();
        assert_eq!(sink.events.len(), 1);
        assert!(sink.events[0].starts_with("move_abs(32767") || sink.events[0].starts_with("move_abs(32768"));
    }

    #[test]
    fn out_of_range_coordinates_are_clamped() {
        let router = InputRouter::new(LoggingSink::default(), monitor());
        router.mouse_move(-1.0, 2.0);
        let sink = router.sink.lock().unwrap();
        assert!(sink.events[0].starts_with("move_abs(0,65535)"));
    }

    #[test]
    fn unknown_button_is_rejected() {
        let router = InputRouter::new(LoggingSink::default(), monitor());
        assert!(router.mouse_button(9, true).is_err());
        assert!(router.mouse_button(0, true).is_ok());
    }

    #[test]
    fn disabled_router_drops_everything() {
        let router = InputRouter::new(LoggingSink::default(), monitor());
        router.disable();
        router.mouse_move(0.5, 0.5);
        assert!(router.sink.lock().unwrap().events.is_empty());
    }

    #[test]
    fn wiggle_center_dispatches_three_moves() {
        let router = InputRouter::new(LoggingSink::default(), monitor());
        router.wiggle_center();
        assert_eq!(router.sink.lock().unwrap().events.len(), 3);
    }
}
