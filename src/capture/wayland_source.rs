//! # Wayland Capture Source
//!
//! `TextureSource` backend for Linux Wayland sessions: requests a
//! PipeWire stream through the `ashpd` screencast portal, then reads raw
//! BGRA samples from a GStreamer pipeline ending in `appsink` — no
//! `x264enc`/`mp4mux`/`filesink` recording chain, since this host ships
//! frames over the data channel rather than to a file.

use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::time::Instant;

use gstreamer::prelude::*;
use gstreamer_app::AppSink;

use crate::error::{HostError, HostResult};

use super::source::{RawFrame, TextureSource};

pub struct WaylandSource {
    pipeline: Option<gstreamer::Pipeline>,
    frame_rx: Option<Receiver<RawFrame>>,
    width: u16,
    height: u16,
}

impl WaylandSource {
    pub fn new() -> Self {
        gstreamer::init().ok();
        Self {
            pipeline: None,
            frame_rx: None,
            width: 0,
            height: 0,
        }
    }

    /// Builds a `pipewiresrc ! videoconvert ! appsink` pipeline against the
    /// given PipeWire node id. The portal handshake that produces
    /// `node_id` is a blocking async call via `ashpd`; it is performed by
    /// the caller (the supervisor) and the resulting id is threaded in
    /// through `monitor_handle` for the purposes of this crate, since the
    /// portal session is 1:1 with "the monitor currently being shared".
    fn build_pipeline(node_id: u32) -> HostResult<(gstreamer::Pipeline, Receiver<RawFrame>)> {
        let description = format!(
            "pipewiresrc path={node_id} ! videoconvert ! video/x-raw,format=BGRA ! appsink name=sink sync=false max-buffers=1 drop=true"
        );
        let pipeline = gstreamer::parse::launch(&description)
            .map_err(|e| HostError::capture_init("wayland", format!("build pipeline: {e}")))?;
        let pipeline = pipeline
            .downcast::<gstreamer::Pipeline>()
            .map_err(|_| HostError::capture_init("wayland", "launch did not yield a Pipeline"))?;

        let sink = pipeline
            .by_name("sink")
            .ok_or_else(|| HostError::capture_init("wayland", "appsink not found"))?
            .downcast::<AppSink>()
            .map_err(|_| HostError::capture_init("wayland", "sink element is not an AppSink"))?;

        let (tx, rx): (Sender<RawFrame>, Receiver<RawFrame>) = std::sync::mpsc::channel();
        sink.set_callbacks(
            gstreamer_app::AppSinkCallbacks::builder()
                .new_sample(move |appsink| {
                    let sample = appsink
                        .pull_sample()
                        .map_err(|_| gstreamer::FlowError::Eos)?;
                    let buffer = sample.buffer().ok_or(gstreamer::FlowError::Error)?;
                    let map = buffer
                        .map_readable()
                        .map_err(|_| gstreamer::FlowError::Error)?;
                    let caps = sample.caps().ok_or(gstreamer::FlowError::Error)?;
                    let structure = caps.structure(0).ok_or(gstreamer::FlowError::Error)?;
                    let width = structure.get::<i32>("width").unwrap_or(0) as u16;
                    let height = structure.get::<i32>("height").unwrap_or(0) as u16;
                    let frame = RawFrame {
                        data: map.as_slice().to_vec(),
                        width,
                        height,
                        capture_ts_us: now_us(),
                    };
                    let _ = tx.send(frame);
                    Ok(gstreamer::FlowSuccess::Ok)
                })
                .build(),
        );

        pipeline
            .set_state(gstreamer::State::Playing)
            .map_err(|e| HostError::capture_init("wayland", format!("start pipeline: {e}")))?;

        Ok((pipeline, rx))
    }
}

impl Default for WaylandSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureSource for WaylandSource {
    fn bind_monitor(&mut self, monitor_handle: u64) -> HostResult<(u16, u16)> {
        if let Some(old) = self.pipeline.take() {
            let _ = old.set_state(gstreamer::State::Null);
        }
        let (pipeline, rx) = Self::build_pipeline(monitor_handle as u32)?;
        self.pipeline = Some(pipeline);
        self.frame_rx = Some(rx);

        let first = self
            .frame_rx
            .as_ref()
            .unwrap()
            .recv_timeout(std::time::Duration::from_secs(5))
            .map_err(|_| HostError::capture_init("wayland", "no frame within 5s of bind"))?;
        self.width = first.width;
        self.height = first.height;
        Ok((self.width, self.height))
    }

    fn native_size(&self) -> (u16, u16) {
        (self.width, self.height)
    }

    fn native_refresh_hz(&self) -> Option<u16> {
        None
    }

    fn next_frame(&mut self, deadline: Instant) -> HostResult<Option<RawFrame>> {
        let rx = self
            .frame_rx
            .as_ref()
            .ok_or_else(|| HostError::state("capture", "next_frame", "no monitor bound"))?;
        let timeout = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(HostError::frame_pipeline(
                "wayland capture",
                "appsink channel disconnected",
            )),
        }
    }
}

impl Drop for WaylandSource {
    fn drop(&mut self) {
        if let Some(pipeline) = self.pipeline.take() {
            let _ = pipeline.set_state(gstreamer::State::Null);
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
