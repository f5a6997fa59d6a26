//! # Core Infrastructure Module
//!
//! Fundamental infrastructure shared by the capture/encode/transport pipeline:
//! the frame slot handoff, the GPU synchronization abstraction, and buffer
//! pooling for zero-allocation chunk serialization.

pub mod buffer_pool;
pub mod frame_slot;
pub mod gpu_sync;

pub use frame_slot::{Frame, FrameSlot};
pub use gpu_sync::{FenceSync, GpuSync, GpuTicket, QuerySync};
