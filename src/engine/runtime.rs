// src/engine/runtime.rs

use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::errors::Result;
use crate::step::StepScheduler;

/// Why [`FrameLoop::run_until`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// The completion predicate held.
    Done,
    /// The shutdown future resolved first.
    Interrupted,
}

/// Calls [`StepScheduler::update`] at a fixed frame rate.
///
/// Each frame passes `None` so the scheduler measures real elapsed time;
/// slow frames therefore show up as larger `dt`, not as extra passes.
pub struct FrameLoop {
    scheduler: StepScheduler,
    frame: Duration,
}

impl fmt::Debug for FrameLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameLoop")
            .field("scheduler", &self.scheduler)
            .field("frame", &self.frame)
            .finish()
    }
}

impl FrameLoop {
    pub fn new(scheduler: StepScheduler, fps: u32) -> Self {
        Self {
            scheduler,
            frame: Duration::from_secs(1) / fps.max(1),
        }
    }

    pub fn scheduler(&self) -> &StepScheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut StepScheduler {
        &mut self.scheduler
    }

    pub fn frame(&self) -> Duration {
        self.frame
    }

    /// Run frames until `done` returns true after a pass, or until
    /// `shutdown` resolves.
    ///
    /// An error from a fail-fast scheduler ends the loop and is returned.
    pub async fn run_until<D, S>(&mut self, mut done: D, shutdown: S) -> Result<LoopExit>
    where
        D: FnMut(&StepScheduler) -> bool,
        S: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.frame);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let started = Instant::now();
        info!(frame = ?self.frame, "frame loop started");

        let exit = loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.scheduler.update(None)?;
                    if done(&self.scheduler) {
                        break LoopExit::Done;
                    }
                }
                _ = &mut shutdown => {
                    debug!("shutdown requested");
                    break LoopExit::Interrupted;
                }
            }
        };

        info!(
            ?exit,
            ticks = self.scheduler.ticks(),
            wall = ?started.elapsed(),
            "frame loop stopped"
        );
        Ok(exit)
    }
}
