//! # Capture
//!
//! Platform-specific screen capture backends (SPEC_FULL §4.3.1) feeding a
//! single shared `CaptureStage` (§4.3).

pub mod source;
pub mod stage;

#[cfg(feature = "capture-scrap")]
pub mod scrap_source;

#[cfg(feature = "capture-wayland")]
pub mod wayland_source;

pub use source::{RawFrame, TextureSource};
pub use stage::{CaptureStage, CaptureState};

/// True when running inside a Wayland session (`XDG_SESSION_TYPE=wayland`),
/// the same environment probe the teacher used to choose between its
/// GStreamer-portal path and its ffmpeg/X11 path.
#[cfg(all(target_os = "linux", feature = "capture-wayland"))]
fn is_wayland_session() -> bool {
    std::env::var("XDG_SESSION_TYPE").as_deref() == Ok("wayland")
}

/// Picks the `TextureSource` backend for this process: the portal/GStreamer
/// path on Wayland, `scrap` everywhere else (§4.3.1).
pub fn select_backend() -> crate::error::HostResult<Box<dyn TextureSource>> {
    #[cfg(all(target_os = "linux", feature = "capture-wayland"))]
    if is_wayland_session() {
        return Ok(Box::new(wayland_source::WaylandSource::new()));
    }

    #[cfg(feature = "capture-scrap")]
    {
        return Ok(Box::new(scrap_source::ScrapSource::new()));
    }

    #[allow(unreachable_code)]
    Err(crate::error::HostError::capture_init(
        "none",
        "no capture backend compiled in: enable capture-scrap or capture-wayland",
    ))
}
