//! # Input
//!
//! Translates wire-protocol mouse/key messages into injected input
//! primitives (SPEC_FULL §4.6).

pub mod keymap;
pub mod router;

pub use router::{InjectSink, InputRouter, LoggingSink};
