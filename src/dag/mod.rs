// src/dag/mod.rs

//! Dependency-graph job orchestration.
//!
//! - [`node`] defines the [`Job`] trait and the [`JobNode`] handle with its
//!   lifecycle, requirements, conditions and spawn tree links.
//! - [`graph`] holds the orchestrator's pending / running / unfinished views.
//! - [`manager`] contains the [`TaskManager`], which runs as a step function
//!   on the step scheduler and moves nodes through their lifecycle.

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod graph;
pub mod manager;
pub mod node;

pub use graph::JobGraph;
pub use manager::{Progress, TaskManager};
pub use node::{Condition, Job, JobContext, JobFuture, JobId, JobNode, JobNodeBuilder, JobState};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
