//! # Scrap Capture Source
//!
//! `TextureSource` backend for Windows/macOS and Linux X11 (as a fallback),
//! built on the `scrap` crate's `Capturer`/`Display`. Frames are copied
//! directly into the caller's pool buffer; there is no ffmpeg subprocess
//! and no muxing, since recording to a file is out of scope.

use std::time::{Duration, Instant};

use scrap::{Capturer, Display};

use crate::error::{HostError, HostResult};

use super::source::{RawFrame, TextureSource};

pub struct ScrapSource {
    capturer: Option<Capturer>,
    width: u16,
    height: u16,
}

impl ScrapSource {
    pub fn new() -> Self {
        Self {
            capturer: None,
            width: 0,
            height: 0,
        }
    }

    fn display_for_handle(handle: u64) -> HostResult<Display> {
        let mut displays = Display::all()
            .map_err(|e| HostError::capture_init("scrap", format!("enumerate displays: {e}")))?;
        if (handle as usize) >= displays.len() {
            return Err(HostError::capture_init(
                "scrap",
                format!("no display at index {handle}"),
            ));
        }
        Ok(displays.remove(handle as usize))
    }
}

impl Default for ScrapSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureSource for ScrapSource {
    fn bind_monitor(&mut self, monitor_handle: u64) -> HostResult<(u16, u16)> {
        let display = Self::display_for_handle(monitor_handle)?;
        let width = display.width() as u16;
        let height = display.height() as u16;
        let capturer = Capturer::new(display)
            .map_err(|e| HostError::capture_init("scrap", format!("create capturer: {e}")))?;
        self.capturer = Some(capturer);
        self.width = width;
        self.height = height;
        Ok((width, height))
    }

    fn native_size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    fn native_refresh_hz(&self) -> Option<u16> {
        None
    }

    fn next_frame(&mut self, deadline: Instant) -> HostResult<Option<RawFrame>> {
        let capturer = self
            .capturer
            .as_mut()
            .ok_or_else(|| HostError::state("capture", "next_frame", "no monitor bound"))?;

        loop {
            match capturer.frame() {
                Ok(frame) => {
                    let capture_ts_us = now_us();
                    return Ok(Some(RawFrame {
                        data: frame.to_vec(),
                        width: self.width,
                        height: self.height,
                        capture_ts_us,
                    }));
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if Instant::now() >= deadline {
                        return Ok(None);
                    }
                    std::thread::sleep(Duration::from_millis(1));
                }
                Err(e) => {
                    return Err(HostError::frame_pipeline(
                        "scrap capture",
                        e.to_string(),
                    ));
                }
            }
        }
    }
}

fn now_us() -> i64 {
    use std::time::SystemTime;
    SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}
