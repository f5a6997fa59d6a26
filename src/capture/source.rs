//! # Texture Source Contract
//!
//! Platform capture backends (`scrap_source`, `wayland_source`) implement
//! this trait; the Capture Stage's pacing/pool logic is written once
//! against it and never branches on platform (SPEC_FULL §4.3.1).

use std::time::Instant;

use crate::error::HostResult;

/// One captured frame, still in host memory, ready to be copied into a
/// pool buffer by the Capture Stage.
pub struct RawFrame {
    pub data: Vec<u8>,
    pub width: u16,
    pub height: u16,
    pub capture_ts_us: i64,
}

/// A platform-specific capture backend bound to a single monitor.
pub trait TextureSource: Send {
    /// (Re)binds the source to `monitor_handle`, reinitializing any
    /// platform session. Returns the bound monitor's native size.
    fn bind_monitor(&mut self, monitor_handle: u64) -> HostResult<(u16, u16)>;

    /// Currently bound monitor's native pixel size.
    fn native_size(&self) -> (u16, u16);

    /// Currently bound monitor's native refresh rate, when known.
    fn native_refresh_hz(&self) -> Option<u16>;

    /// Blocks for the next available frame, up to `deadline`. Returns
    /// `None` on timeout so the Capture Stage can re-check pacing/shutdown
    /// state rather than block forever.
    fn next_frame(&mut self, deadline: Instant) -> HostResult<Option<RawFrame>>;
}
