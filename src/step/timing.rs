// src/step/timing.rs

//! Timing primitives.
//!
//! A [`Wait`] is what a running task hands back to the scheduler: "run me
//! again after X". The scheduler turns it into an armed [`Readiness`],
//! anchored to the pass that produced it, and evaluates that against every
//! following [`Snapshot`] until it holds.

use std::time::Duration;

use crate::step::scheduler::Snapshot;
use crate::step::task::TaskHandle;

/// When a continuation should next run.
#[derive(Debug, Clone)]
pub enum Wait {
    /// After this much scheduler time has elapsed.
    After(Duration),
    /// After this many passes (at least one).
    Ticks(u64),
    /// On the next pass.
    NextTick,
    /// After the given task has executed one more step (or finished).
    NextStepOf(TaskHandle),
    /// After the given task has completed or been canceled.
    CompletionOf(TaskHandle),
    /// Do not run again.
    Stop,
}

impl Wait {
    /// `After` from fractional seconds. Negative or non-finite values mean
    /// "as soon as possible".
    pub fn seconds(secs: f64) -> Self {
        Wait::After(Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO))
    }

    pub fn is_stop(&self) -> bool {
        matches!(self, Wait::Stop)
    }
}

/// Armed readiness predicate of a pending task.
#[derive(Debug, Clone)]
pub enum Readiness {
    /// Ready once total elapsed time reaches this point.
    At(Duration),
    /// Ready once the pass counter reaches this value.
    AtTick(u64),
    /// Ready once `task` has run more often than `seen_runs`, or is finished.
    StepOf { task: TaskHandle, seen_runs: u64 },
    /// Ready once `task` is completed or canceled.
    CompletionOf(TaskHandle),
}

impl Readiness {
    /// Arm `wait` relative to a clock reading of `elapsed` / `ticks`.
    ///
    /// Returns `None` for [`Wait::Stop`].
    pub fn arm(wait: Wait, elapsed: Duration, ticks: u64) -> Option<Self> {
        let armed = match wait {
            Wait::After(delay) => Readiness::At(elapsed.saturating_add(delay)),
            Wait::Ticks(n) => Readiness::AtTick(ticks.saturating_add(n.max(1))),
            Wait::NextTick => Readiness::AtTick(ticks.saturating_add(1)),
            Wait::NextStepOf(task) => {
                let seen_runs = task.run_count();
                Readiness::StepOf { task, seen_runs }
            }
            Wait::CompletionOf(task) => Readiness::CompletionOf(task),
            Wait::Stop => return None,
        };
        Some(armed)
    }

    pub fn is_ready(&self, snapshot: &Snapshot) -> bool {
        match self {
            Readiness::At(due) => snapshot.elapsed >= *due,
            Readiness::AtTick(due) => snapshot.ticks >= *due,
            Readiness::StepOf { task, seen_runs } => {
                task.run_count() > *seen_runs || task.is_finished()
            }
            Readiness::CompletionOf(task) => task.is_finished(),
        }
    }
}

/// Next point on the grid `prev + k * interval` that lies strictly after
/// `now`, plus the number of grid points in `(prev, now]` that were skipped
/// over besides the one being fired.
///
/// A zero interval yields `now` (fire on every pass).
pub fn next_on_grid(prev: Duration, interval: Duration, now: Duration) -> (Duration, u64) {
    if interval.is_zero() {
        return (now, 0);
    }

    let next = prev.saturating_add(interval);
    if next > now {
        return (next, 0);
    }

    // Collapse every grid point at or before `now` into this fire.
    let step = interval.as_nanos();
    let behind = now.as_nanos() - next.as_nanos();
    let skipped = behind / step + 1;
    let target = next.as_nanos() + skipped * step;
    (duration_from_nanos(target), skipped as u64)
}

fn duration_from_nanos(nanos: u128) -> Duration {
    const NANOS_PER_SEC: u128 = 1_000_000_000;
    let secs = (nanos / NANOS_PER_SEC).min(u64::MAX as u128) as u64;
    let sub = (nanos % NANOS_PER_SEC) as u32;
    Duration::new(secs, sub)
}
