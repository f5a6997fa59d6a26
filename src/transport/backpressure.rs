//! # Backpressure Discipline
//!
//! The data channel's buffered-amount is the single source of truth for
//! congestion (SPEC_FULL §5, §4.5.3). `BT` is the skip threshold; `2×BT`
//! mid-frame truncates; ten consecutive overflow trips force a disconnect.

use std::sync::atomic::{AtomicU32, Ordering};

pub const BT: u64 = 32_768;
pub const STALE_DISCONNECT_TRIPS: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDecision {
    Send,
    SkipWhole,
    TruncateMidFrame,
}

/// Tracks consecutive backpressure trips across frames; a clean frame
/// resets the counter.
#[derive(Debug, Default)]
pub struct BackpressureTracker {
    consecutive_trips: AtomicU32,
}

impl BackpressureTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluated once before starting a frame.
    pub fn before_frame(&self, buffered_amount: u64) -> FrameDecision {
        if buffered_amount > BT {
            self.consecutive_trips.fetch_add(1, Ordering::AcqRel);
            FrameDecision::SkipWhole
        } else {
            FrameDecision::Send
        }
    }

    /// Evaluated before each chunk after the first, within a frame already
    /// in progress.
    pub fn before_chunk(&self, buffered_amount: u64) -> FrameDecision {
        if buffered_amount > 2 * BT {
            self.consecutive_trips.fetch_add(1, Ordering::AcqRel);
            FrameDecision::TruncateMidFrame
        } else {
            FrameDecision::Send
        }
    }

    /// Call after a frame that completed without tripping either threshold.
    pub fn clean_frame(&self) {
        self.consecutive_trips.store(0, Ordering::Release);
    }

    pub fn consecutive_trips(&self) -> u32 {
        self.consecutive_trips.load(Ordering::Acquire)
    }

    pub fn should_disconnect(&self) -> bool {
        self.consecutive_trips() >= STALE_DISCONNECT_TRIPS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn under_threshold_sends() {
        let tracker = BackpressureTracker::new();
        assert_eq!(tracker.before_frame(BT), FrameDecision::Send);
        assert_eq!(tracker.before_chunk(2 * BT), FrameDecision::Send);
    }

    #[test]
    fn over_bt_skips_whole_frame() {
        let tracker = BackpressureTracker::new();
        assert_eq!(tracker.before_frame(BT + 1), FrameDecision::SkipWhole);
        assert_eq!(tracker.consecutive_trips(), 1);
    }

    #[test]
    fn over_two_bt_truncates_mid_frame() {
        let tracker = BackpressureTracker::new();
        assert_eq!(
            tracker.before_chunk(2 * BT + 1),
            FrameDecision::TruncateMidFrame
        );
    }

    #[test]
    fn ten_consecutive_trips_trigger_disconnect() {
        let tracker = BackpressureTracker::new();
        for _ in 0..9 {
            tracker.before_frame(BT + 1);
        }
        assert!(!tracker.should_disconnect());
        tracker.before_frame(BT + 1);
        assert!(tracker.should_disconnect());
    }

    #[test]
    fn clean_frame_resets_counter() {
        let tracker = BackpressureTracker::new();
        tracker.before_frame(BT + 1);
        tracker.clean_frame();
        assert_eq!(tracker.consecutive_trips(), 0);
    }
}
