//! # Frame Slot
//!
//! The single-producer/single-consumer handoff between the capture stage and
//! the encoder stage. Three slots are kept so the producer can always write
//! into a slot the consumer isn't reading, with one spare for overlap; a
//! 32-bit bitmap tracks which pool textures are currently referenced by a
//! live slot entry.
//!
//! ## Design
//!
//! Rather than a lock-free triple buffer, the slot uses a small critical
//! section (a `Mutex` + `Condvar`) around plain slot bookkeeping. The
//! in-flight bitmap is *not* maintained incrementally with per-bit
//! clear/set races; it's recomputed from the three slots on every mutation
//! while still holding the lock, so it can never drift from the live set of
//! pool indices by construction.
//!
//! Capture never blocks on this structure: `push` only takes the lock for
//! the duration of a few field assignments. The consumer's `pop` may block
//! up to a caller-supplied timeout waiting for new data.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::core::gpu_sync::GpuTicket;

/// One produced frame: an owned reference to pool texture `pool_idx`, its
/// capture timestamp (microseconds since the Unix epoch), and the GPU-work
/// ticket that must be waited on before the texture's contents are final.
///
/// `Frame` itself carries no texture data — the texture lives in the
/// capture stage's pool, indexed by `pool_idx`. This type is the "ticket
/// plus timestamp" that travels through the Frame Slot and the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub pool_idx: usize,
    pub capture_ts_us: i64,
    pub ticket: GpuTicket,
}

#[derive(Debug, Default)]
struct Inner {
    slots: [Option<Frame>; 3],
    /// Slot index most recently published by `push`, waiting to be popped.
    ready: Option<usize>,
    /// Slot index currently on loan to the consumer (popped, not yet released).
    reader: Option<usize>,
    /// Rotation hint for picking the next write slot.
    write_hint: usize,
}

impl Inner {
    fn recompute_bitmap(&self) -> u32 {
        self.slots
            .iter()
            .flatten()
            .fold(0u32, |acc, f| acc | (1u32 << f.pool_idx))
    }

    fn next_write_index(&self) -> usize {
        for offset in 0..3 {
            let candidate = (self.write_hint + offset) % 3;
            if Some(candidate) != self.reader && Some(candidate) != self.ready {
                return candidate;
            }
        }
        // Unreachable with 3 slots and at most 2 occupied (ready + reader),
        // but fall back to the hint rather than panicking.
        self.write_hint % 3
    }
}

/// The SPSC frame handoff. See module docs for the design rationale.
#[derive(Debug)]
pub struct FrameSlot {
    inner: Mutex<Inner>,
    data_available: Condvar,
    bitmap: AtomicU32,
    /// Count of `find_available_texture` calls that found the pool fully
    /// in-flight. Not user-visible; a diagnostic counter per §4.1.
    pool_conflicts: AtomicU64,
    /// Rotating cursor for `find_available_texture`, independent of the
    /// slot bookkeeping above — it walks the capture stage's texture pool,
    /// not the three frame slots.
    scan_cursor: AtomicU32,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            data_available: Condvar::new(),
            bitmap: AtomicU32::new(0),
            pool_conflicts: AtomicU64::new(0),
            scan_cursor: AtomicU32::new(0),
        }
    }

    /// Publishes a frame. Non-blocking: takes the slot's small critical
    /// section, overwrites the oldest non-live slot, and wakes the consumer.
    /// If the consumer is slower than the producer, the previously-ready
    /// frame is silently dropped (lossy for latency, by design).
    pub fn push(&self, frame: Frame) {
        let mut inner = self.inner.lock().unwrap();
        let w = inner.next_write_index();
        inner.slots[w] = Some(frame);
        inner.ready = Some(w);
        inner.write_hint = (w + 1) % 3;
        self.bitmap.store(inner.recompute_bitmap(), Ordering::Release);
        drop(inner);
        self.data_available.notify_one();
    }

    /// Waits up to `timeout` for a published frame, then hands the reader
    /// slot to the caller. The returned frame's pool texture stays in-flight
    /// until `mark_released` is called.
    pub fn pop(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        let mut inner = self.inner.lock().unwrap();
        loop {
            if let Some(ready_idx) = inner.ready.take() {
                let frame = inner.slots[ready_idx];
                inner.reader = Some(ready_idx);
                self.bitmap.store(inner.recompute_bitmap(), Ordering::Release);
                return frame;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, timeout_result) = self
                .data_available
                .wait_timeout(inner, deadline - now)
                .unwrap();
            inner = guard;
            if timeout_result.timed_out() && inner.ready.is_none() {
                return None;
            }
        }
    }

    /// Releases the pool texture currently on loan to the consumer, clearing
    /// its in-flight bit. A no-op if `pool_idx` doesn't match the reader
    /// slot's frame (already released, or never held).
    pub fn mark_released(&self, pool_idx: usize) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(reader_idx) = inner.reader {
            if inner.slots[reader_idx].is_some_and(|f| f.pool_idx == pool_idx) {
                inner.slots[reader_idx] = None;
                inner.reader = None;
                self.bitmap.store(inner.recompute_bitmap(), Ordering::Release);
            }
        }
    }

    /// Returns whether `pool_idx` is currently held by a live slot entry.
    pub fn is_in_flight(&self, pool_idx: usize) -> bool {
        self.bitmap.load(Ordering::Acquire) & (1u32 << pool_idx) != 0
    }

    /// The current in-flight bitmap, for invariant checks (P1) and tests.
    pub fn in_flight_bitmap(&self) -> u32 {
        self.bitmap.load(Ordering::Acquire)
    }

    /// Drops all slot state, clearing the bitmap. Used when the capture
    /// stage rebuilds its pool (monitor switch, encoder rebuild).
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = Inner::default();
        self.bitmap.store(0, Ordering::Release);
    }

    /// Scans `pool_size` pool textures starting at a rotating cursor for one
    /// whose in-flight bit is clear. Returns `None` if the whole pool is
    /// in-flight (counted as a conflict); the capture stage drops the frame
    /// in that case rather than racing a write against the encoder, per the
    /// "drop, don't reuse" design decision for the texture-pool conflict
    /// fallback (SPEC_FULL §9).
    pub fn find_available_texture(&self, pool_size: usize) -> Option<usize> {
        debug_assert!(pool_size <= 32, "in-flight bitmap is 32 bits wide");
        let bitmap = self.bitmap.load(Ordering::Acquire);
        let start = self.scan_cursor.load(Ordering::Relaxed) as usize % pool_size;
        for offset in 0..pool_size {
            let idx = (start + offset) % pool_size;
            if bitmap & (1u32 << idx) == 0 {
                self.scan_cursor.store((idx + 1) as u32, Ordering::Relaxed);
                return Some(idx);
            }
        }
        self.pool_conflicts.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Count of fully-in-flight pool scans since construction (or the last
    /// `reset`), for stats/logging.
    pub fn pool_conflicts(&self) -> u64 {
        self.pool_conflicts.load(Ordering::Relaxed)
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(pool_idx: usize, ts: i64) -> Frame {
        Frame {
            pool_idx,
            capture_ts_us: ts,
            ticket: GpuTicket::new(pool_idx as u64),
        }
    }

    #[test]
    fn push_then_pop_roundtrips() {
        let slot = FrameSlot::new();
        slot.push(frame(2, 100));
        let popped = slot.pop(Duration::from_millis(10)).unwrap();
        assert_eq!(popped.pool_idx, 2);
        assert_eq!(popped.capture_ts_us, 100);
    }

    #[test]
    fn pop_times_out_when_empty() {
        let slot = FrameSlot::new();
        assert!(slot.pop(Duration::from_millis(5)).is_none());
    }

    #[test]
    fn bitmap_tracks_live_entries_p1() {
        let slot = FrameSlot::new();
        slot.push(frame(3, 1));
        assert_eq!(slot.in_flight_bitmap(), 1 << 3);
        let popped = slot.pop(Duration::from_millis(10)).unwrap();
        // still in flight: on loan to the consumer until mark_released.
        assert!(slot.is_in_flight(popped.pool_idx));
        slot.mark_released(popped.pool_idx);
        assert_eq!(slot.in_flight_bitmap(), 0);
    }

    #[test]
    fn faster_producer_overwrites_unread_ready_slot() {
        let slot = FrameSlot::new();
        slot.push(frame(0, 1));
        slot.push(frame(1, 2));
        let popped = slot.pop(Duration::from_millis(10)).unwrap();
        // Only the most recent push survives to be popped.
        assert_eq!(popped.pool_idx, 1);
        // Pool index 0 was dropped without ever being marked in-flight past
        // the overwrite, so its bit must not linger.
        assert!(!slot.is_in_flight(0));
    }

    #[test]
    fn find_available_texture_reports_conflict_when_full() {
        let slot = FrameSlot::new();
        slot.push(frame(0, 1));
        let popped = slot.pop(Duration::from_millis(10)).unwrap();
        // pool_size 1, and that single index is in flight.
        assert!(slot.find_available_texture(1).is_none());
        assert_eq!(slot.pool_conflicts(), 1);
        slot.mark_released(popped.pool_idx);
        assert_eq!(slot.find_available_texture(1), Some(0));
    }

    #[test]
    fn reset_clears_state() {
        let slot = FrameSlot::new();
        slot.push(frame(5, 1));
        slot.reset();
        assert_eq!(slot.in_flight_bitmap(), 0);
        assert!(slot.pop(Duration::from_millis(5)).is_none());
    }
}
