// src/step/task.rs

//! Pending tasks: the units of work owned by the step scheduler.
//!
//! - [`TaskHandle`] is the shared state block of one pending task. It can be
//!   cloned freely and used from any thread to cancel, pause or observe the
//!   task.
//! - [`Pending`] is the body: executed once per pass while ready, it hands
//!   back the next [`Wait`] or `None` when finished.
//! - [`OneShot`], [`Periodic`], [`PeriodicTicks`] and [`StepFunction`] are
//!   the bodies behind the scheduling calls of [`Schedule`](super::Schedule).

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use anyhow::Result;
use tracing::trace;

use crate::step::scheduler::TaskContext;
use crate::step::timing::{Wait, next_on_grid};

/// Identifier of a pending task, unique per scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
struct TaskState {
    id: TaskId,
    label: OnceLock<String>,
    completed: AtomicBool,
    canceled: AtomicBool,
    paused: AtomicBool,
    runs: AtomicU64,
}

/// Shared handle to the state block of a pending task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    state: Arc<TaskState>,
}

impl TaskHandle {
    pub(crate) fn new(id: TaskId) -> Self {
        Self {
            state: Arc::new(TaskState {
                id,
                label: OnceLock::new(),
                completed: AtomicBool::new(false),
                canceled: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                runs: AtomicU64::new(0),
            }),
        }
    }

    /// Attach a diagnostic label. Only the first label sticks.
    pub fn with_label(self, label: impl Into<String>) -> Self {
        let _ = self.state.label.set(label.into());
        self
    }

    pub fn id(&self) -> TaskId {
        self.state.id
    }

    pub fn label(&self) -> Option<&str> {
        self.state.label.get().map(String::as_str)
    }

    /// Label if one was given, otherwise `task-<id>`.
    pub fn name(&self) -> String {
        match self.label() {
            Some(label) => label.to_string(),
            None => format!("task-{}", self.state.id),
        }
    }

    /// Cancel the task. It is dropped silently at its next evaluation.
    pub fn cancel(&self) {
        self.state.canceled.store(true, Ordering::Release);
    }

    pub fn pause(&self) {
        self.state.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.state.paused.store(false, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.state.canceled.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused.load(Ordering::Acquire)
    }

    pub fn is_completed(&self) -> bool {
        self.state.completed.load(Ordering::Acquire)
    }

    /// Completed or canceled.
    pub fn is_finished(&self) -> bool {
        self.is_completed() || self.is_canceled()
    }

    /// How many times the body has been executed.
    pub fn run_count(&self) -> u64 {
        self.state.runs.load(Ordering::Acquire)
    }

    pub(crate) fn record_run(&self) {
        self.state.runs.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn mark_completed(&self) {
        self.state.completed.store(true, Ordering::Release);
    }
}

impl PartialEq for TaskHandle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl Eq for TaskHandle {}

/// Body of a pending task.
///
/// `run` is called once per pass while the task is ready. Returning
/// `Ok(Some(wait))` re-arms the task, `Ok(None)` (or `Some(Wait::Stop)`)
/// retires it. An `Err` is contained by the scheduler and also retires it.
pub trait Pending: Send {
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<Option<Wait>>;
}

/// Runs an action once.
pub struct OneShot<F> {
    action: Option<F>,
}

impl<F> OneShot<F> {
    pub fn new(action: F) -> Self {
        Self {
            action: Some(action),
        }
    }
}

impl<F> Pending for OneShot<F>
where
    F: FnOnce(&mut TaskContext<'_>) -> Result<()> + Send,
{
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<Option<Wait>> {
        if let Some(action) = self.action.take() {
            action(ctx)?;
        }
        Ok(None)
    }
}

/// Runs an action on a fixed time grid.
///
/// The next target is always `previous target + interval`, so jitter in
/// pass timing never accumulates. Grid points missed between two sparse
/// passes collapse into a single fire.
pub struct Periodic<F> {
    action: F,
    interval: Duration,
    next_due: Duration,
}

impl<F> Periodic<F> {
    pub fn new(action: F, interval: Duration, first_due: Duration) -> Self {
        Self {
            action,
            interval,
            next_due: first_due,
        }
    }
}

impl<F> Pending for Periodic<F>
where
    F: FnMut(&mut TaskContext<'_>) -> Result<()> + Send,
{
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<Option<Wait>> {
        (self.action)(ctx)?;

        let now = ctx.snapshot().elapsed;
        let (next, skipped) = next_on_grid(self.next_due, self.interval, now);
        if skipped > 0 {
            trace!(
                skipped,
                interval = ?self.interval,
                "periodic task collapsed missed fires into one pass"
            );
        }
        self.next_due = next;
        Ok(Some(Wait::After(next.saturating_sub(now))))
    }
}

/// Runs an action every `interval` passes.
pub struct PeriodicTicks<F> {
    action: F,
    interval: u64,
    next_due: u64,
}

impl<F> PeriodicTicks<F> {
    pub fn new(action: F, interval: u64, first_due: u64) -> Self {
        Self {
            action,
            interval: interval.max(1),
            next_due: first_due,
        }
    }
}

impl<F> Pending for PeriodicTicks<F>
where
    F: FnMut(&mut TaskContext<'_>) -> Result<()> + Send,
{
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<Option<Wait>> {
        (self.action)(ctx)?;

        let now = ctx.snapshot().ticks;
        let mut next = self.next_due.saturating_add(self.interval);
        if next <= now {
            let behind = now - next;
            next += (behind / self.interval + 1) * self.interval;
        }
        self.next_due = next;
        Ok(Some(Wait::Ticks(next - now)))
    }
}

/// Repeatedly invokes a step closure that decides its own next wake-up.
///
/// The closure keeps whatever progress state it needs across calls; this is
/// how long, suspendable workflows are written without coroutines.
pub struct StepFunction<F> {
    step: F,
}

impl<F> StepFunction<F> {
    pub fn new(step: F) -> Self {
        Self { step }
    }
}

impl<F> Pending for StepFunction<F>
where
    F: FnMut(&mut TaskContext<'_>) -> Result<Wait> + Send,
{
    fn run(&mut self, ctx: &mut TaskContext<'_>) -> Result<Option<Wait>> {
        match (self.step)(ctx)? {
            Wait::Stop => Ok(None),
            wait => Ok(Some(wait)),
        }
    }
}
