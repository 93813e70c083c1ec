// src/step/mod.rs

//! Tick-driven cooperative step scheduler.
//!
//! - [`timing`] holds the timing primitives ([`Wait`]) and their armed form.
//! - [`task`] defines the pending-task abstraction, its shared handle and the
//!   built-in bodies (one-shot, periodic, step function).
//! - [`scheduler`] owns the pass loop, the clock and the add-buffer.
//!
//! Nothing in here touches an async runtime: continuations are explicit
//! values, and a pass is a plain loop over boxed task bodies.

pub mod scheduler;
pub mod task;
pub mod timing;

pub use scheduler::{Schedule, Snapshot, StepScheduler, TaskContext, TaskQueue};
pub use task::{Pending, TaskHandle, TaskId};
pub use timing::{Readiness, Wait};
