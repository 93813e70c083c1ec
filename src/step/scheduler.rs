// src/step/scheduler.rs

//! The tick-driven step scheduler.
//!
//! Each call to [`StepScheduler::update`] advances the clock and performs
//! exactly one pass over the working set. Tasks scheduled while a pass is
//! running land in the add-buffer and are only seen by the *next* pass, so
//! the set being iterated is never mutated underneath the loop.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::{Duration, Instant};

use anyhow::{Result as AnyResult, anyhow};
use tracing::{debug, error, trace};

use crate::config::model::SchedulerConfig;
use crate::errors::{Result, TickdagError};
use crate::step::task::{
    OneShot, Pending, Periodic, PeriodicTicks, StepFunction, TaskHandle, TaskId,
};
use crate::step::timing::{Readiness, Wait};

/// Immutable view of the scheduler clock for one task evaluation.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Total scheduler time.
    pub elapsed: Duration,
    /// Total number of passes so far, including the current one.
    pub ticks: u64,
    /// The task currently being evaluated, if any.
    pub current: Option<TaskHandle>,
}

/// One task waiting in the scheduler.
pub(crate) struct Entry {
    handle: TaskHandle,
    readiness: Readiness,
    body: Box<dyn Pending>,
}

/// The add-buffer plus the clock reading new tasks are armed against.
///
/// Reachable through [`Schedule::queue`]; it has no public API of its own.
pub struct TaskQueue {
    incoming: Vec<Entry>,
    next_id: u64,
    elapsed: Duration,
    ticks: u64,
}

impl TaskQueue {
    fn new() -> Self {
        Self {
            incoming: Vec::new(),
            next_id: 1,
            elapsed: Duration::ZERO,
            ticks: 0,
        }
    }

    fn push(&mut self, first: Wait, body: Box<dyn Pending>) -> TaskHandle {
        let handle = TaskHandle::new(TaskId(self.next_id));
        self.next_id += 1;

        match Readiness::arm(first, self.elapsed, self.ticks) {
            Some(readiness) => {
                trace!(task = %handle.id(), ?readiness, "task added to add-buffer");
                self.incoming.push(Entry {
                    handle: handle.clone(),
                    readiness,
                    body,
                });
            }
            None => handle.mark_completed(),
        }

        handle
    }
}

/// Scheduling calls shared by the scheduler itself and by [`TaskContext`],
/// so that running tasks can schedule more work.
pub trait Schedule {
    fn queue(&mut self) -> &mut TaskQueue;

    /// Schedule a custom [`Pending`] body, first evaluated after `first`.
    fn schedule(&mut self, first: Wait, body: Box<dyn Pending>) -> TaskHandle {
        self.queue().push(first, body)
    }

    /// Run `action` once after `delay` of scheduler time.
    fn after<F>(&mut self, delay: Duration, action: F) -> TaskHandle
    where
        F: FnOnce(&mut TaskContext<'_>) -> AnyResult<()> + Send + 'static,
    {
        self.schedule(Wait::After(delay), Box::new(OneShot::new(action)))
    }

    /// Run `action` once after `ticks` passes.
    fn after_ticks<F>(&mut self, ticks: u64, action: F) -> TaskHandle
    where
        F: FnOnce(&mut TaskContext<'_>) -> AnyResult<()> + Send + 'static,
    {
        self.schedule(Wait::Ticks(ticks), Box::new(OneShot::new(action)))
    }

    /// Run `action` every `interval` of scheduler time.
    ///
    /// With `run_immediately` the first fire happens on the next pass and the
    /// grid is anchored at the current time; otherwise the first fire is one
    /// interval from now.
    fn every<F>(&mut self, interval: Duration, action: F, run_immediately: bool) -> TaskHandle
    where
        F: FnMut(&mut TaskContext<'_>) -> AnyResult<()> + Send + 'static,
    {
        let queue = self.queue();
        let now = queue.elapsed;
        let first_due = if run_immediately {
            now
        } else {
            now.saturating_add(interval)
        };
        queue.push(
            Wait::After(first_due - now),
            Box::new(Periodic::new(action, interval, first_due)),
        )
    }

    /// Run `action` every `ticks` passes.
    fn every_ticks<F>(&mut self, ticks: u64, action: F, run_immediately: bool) -> TaskHandle
    where
        F: FnMut(&mut TaskContext<'_>) -> AnyResult<()> + Send + 'static,
    {
        let queue = self.queue();
        let interval = ticks.max(1);
        let (first, first_due) = if run_immediately {
            (Wait::NextTick, queue.ticks + 1)
        } else {
            (Wait::Ticks(interval), queue.ticks + interval)
        };
        queue.push(first, Box::new(PeriodicTicks::new(action, interval, first_due)))
    }

    /// Drive `step` until it returns [`Wait::Stop`]. First call on the next pass.
    fn run_step_function<F>(&mut self, step: F) -> TaskHandle
    where
        F: FnMut(&mut TaskContext<'_>) -> AnyResult<Wait> + Send + 'static,
    {
        self.schedule(Wait::NextTick, Box::new(StepFunction::new(step)))
    }

    /// Run `action` once `task` has executed another step (or finished).
    fn when_next_step_of<F>(&mut self, task: &TaskHandle, action: F) -> TaskHandle
    where
        F: FnOnce(&mut TaskContext<'_>) -> AnyResult<()> + Send + 'static,
    {
        self.schedule(
            Wait::NextStepOf(task.clone()),
            Box::new(OneShot::new(action)),
        )
    }

    /// Run `action` once `task` has completed or been canceled.
    fn when_completed<F>(&mut self, task: &TaskHandle, action: F) -> TaskHandle
    where
        F: FnOnce(&mut TaskContext<'_>) -> AnyResult<()> + Send + 'static,
    {
        self.schedule(
            Wait::CompletionOf(task.clone()),
            Box::new(OneShot::new(action)),
        )
    }
}

/// What a running task sees: the pass snapshot and the add-buffer.
pub struct TaskContext<'a> {
    snapshot: Snapshot,
    queue: &'a mut TaskQueue,
}

impl<'a> TaskContext<'a> {
    fn new(snapshot: Snapshot, queue: &'a mut TaskQueue) -> Self {
        Self { snapshot, queue }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Handle of the task being executed.
    pub fn current(&self) -> Option<&TaskHandle> {
        self.snapshot.current.as_ref()
    }

    pub fn elapsed(&self) -> Duration {
        self.snapshot.elapsed
    }

    pub fn ticks(&self) -> u64 {
        self.snapshot.ticks
    }
}

impl Schedule for TaskContext<'_> {
    fn queue(&mut self) -> &mut TaskQueue {
        self.queue
    }
}

/// Cooperative scheduler driven by an external host loop.
pub struct StepScheduler {
    config: SchedulerConfig,
    queue: TaskQueue,
    active: Vec<Entry>,
    last_update: Option<Instant>,
}

impl std::fmt::Debug for StepScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepScheduler")
            .field("config", &self.config)
            .field("elapsed", &self.queue.elapsed)
            .field("ticks", &self.queue.ticks)
            .field("tasks", &self.len())
            .finish_non_exhaustive()
    }
}

impl Default for StepScheduler {
    fn default() -> Self {
        Self::new(SchedulerConfig::default())
    }
}

impl StepScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            queue: TaskQueue::new(),
            active: Vec::new(),
            last_update: None,
        }
    }

    /// Total scheduler time.
    pub fn elapsed(&self) -> Duration {
        self.queue.elapsed
    }

    /// Number of passes performed.
    pub fn ticks(&self) -> u64 {
        self.queue.ticks
    }

    /// Tasks waiting in the working set or the add-buffer.
    pub fn len(&self) -> usize {
        self.active.len() + self.queue.incoming.len()
    }

    pub fn is_idle(&self) -> bool {
        self.len() == 0
    }

    /// Cancel every task currently known to the scheduler.
    pub fn cancel_all(&mut self) {
        for entry in self.active.iter().chain(self.queue.incoming.iter()) {
            entry.handle.cancel();
        }
    }

    /// Advance the clock and perform one pass.
    ///
    /// With `dt = None` the wall-clock time since the previous update is
    /// used (zero on the first call).
    pub fn update(&mut self, dt: Option<Duration>) -> Result<()> {
        let now = Instant::now();
        let dt = dt.unwrap_or_else(|| {
            self.last_update
                .map(|last| now.saturating_duration_since(last))
                .unwrap_or(Duration::ZERO)
        });
        self.last_update = Some(now);

        self.queue.elapsed = self.queue.elapsed.saturating_add(dt);
        self.queue.ticks += 1;

        self.run_pass()
    }

    fn run_pass(&mut self) -> Result<()> {
        let elapsed = self.queue.elapsed;
        let ticks = self.queue.ticks;

        let mut working = std::mem::take(&mut self.active);
        working.append(&mut self.queue.incoming);

        trace!(tick = ticks, ?elapsed, tasks = working.len(), "scheduler pass");

        let mut survivors = Vec::with_capacity(working.len());
        let mut remaining = working.into_iter();

        while let Some(mut entry) = remaining.next() {
            let handle = entry.handle.clone();

            if handle.is_canceled() || handle.is_completed() {
                trace!(task = %handle.name(), "dropping finished task");
                continue;
            }

            let snapshot = Snapshot {
                elapsed,
                ticks,
                current: Some(handle.clone()),
            };

            if handle.is_paused() || !entry.readiness.is_ready(&snapshot) {
                survivors.push(entry);
                continue;
            }

            let outcome = {
                let mut ctx = TaskContext::new(snapshot, &mut self.queue);
                let body = &mut entry.body;
                panic::catch_unwind(AssertUnwindSafe(|| body.run(&mut ctx))).unwrap_or_else(
                    |payload| Err(anyhow!("task panicked: {}", panic_message(payload.as_ref()))),
                )
            };
            handle.record_run();

            match outcome {
                Ok(Some(wait)) => match Readiness::arm(wait, elapsed, ticks) {
                    Some(readiness) => {
                        entry.readiness = readiness;
                        survivors.push(entry);
                    }
                    None => {
                        handle.mark_completed();
                        debug!(task = %handle.name(), tick = ticks, "task stopped");
                    }
                },
                Ok(None) => {
                    handle.mark_completed();
                    trace!(task = %handle.name(), tick = ticks, "task completed");
                }
                Err(err) => {
                    handle.mark_completed();

                    // A fail-fast task manager always stops the driver.
                    if self.config.fail_fast || is_job_failure(&err) {
                        // Keep the untouched rest of this pass for the next one.
                        survivors.extend(remaining);
                        self.active = survivors;
                        return Err(escalate(handle.name(), err));
                    }

                    error!(
                        task = %handle.name(),
                        tick = ticks,
                        error = %format!("{err:#}"),
                        "task failed; continuing pass"
                    );
                }
            }
        }

        self.active = survivors;
        Ok(())
    }
}

fn is_job_failure(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<TickdagError>(),
        Some(TickdagError::JobFailed { .. })
    )
}

fn escalate(task: String, err: anyhow::Error) -> TickdagError {
    match err.downcast::<TickdagError>() {
        Ok(failed @ TickdagError::JobFailed { .. }) => failed,
        Ok(other) => TickdagError::TaskFailed {
            task,
            source: other.into(),
        },
        Err(err) => TickdagError::TaskFailed { task, source: err },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl Schedule for StepScheduler {
    fn queue(&mut self) -> &mut TaskQueue {
        &mut self.queue
    }
}
