// src/engine/mod.rs

//! Host loop for the demo runner.
//!
//! The step scheduler never drives itself; an embedding application calls
//! `update` once per frame. [`runtime`] provides that frame loop on top of a
//! tokio interval so the binary and integration tests have a host.

pub mod runtime;

pub use runtime::{FrameLoop, LoopExit};
