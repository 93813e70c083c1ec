// src/exec/simulated.rs

//! Simulated jobs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::bail;
use tracing::{debug, info, warn};

use crate::config::model::{ConfigFile, JobConfig};
use crate::dag::{Job, JobContext, JobFuture, JobNode};
use crate::exec::plan::build_node;

/// Longest single sleep of a simulated body before it re-checks for
/// cancellation.
const CANCEL_POLL: Duration = Duration::from_millis(25);

/// A job from the plan file. Its body only waits; `follow_up` jobs are
/// spawned from the completion hook.
#[derive(Debug)]
pub struct SimulatedJob {
    name: String,
    config: JobConfig,
    plan: Arc<ConfigFile>,
}

impl SimulatedJob {
    pub fn new(name: impl Into<String>, config: JobConfig, plan: Arc<ConfigFile>) -> Self {
        Self {
            name: name.into(),
            config,
            plan,
        }
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }
}

impl Job for SimulatedJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Arc<Self>, ctx: JobContext) -> JobFuture {
        Box::pin(async move {
            let total = Duration::from_millis(self.config.duration_ms);
            info!(job = %ctx.name(), duration_ms = self.config.duration_ms, "job running");

            let mut remaining = total;
            while !remaining.is_zero() {
                if ctx.is_canceled() {
                    warn!(job = %ctx.name(), "job canceled while running");
                    return Ok(());
                }
                let slice = remaining.min(CANCEL_POLL);
                tokio::time::sleep(slice).await;
                remaining -= slice;
            }

            if self.config.fail {
                bail!("simulated failure after {}ms", self.config.duration_ms);
            }

            debug!(job = %ctx.name(), "job body done");
            Ok(())
        })
    }

    fn on_completed(&self) -> Vec<JobNode> {
        self.config
            .follow_up
            .iter()
            .filter_map(|child| match build_node(&self.plan, child, Vec::new()) {
                Ok(node) => Some(node),
                Err(err) => {
                    warn!(job = %self.name, follow_up = %child, error = %err, "cannot build follow-up job");
                    None
                }
            })
            .collect()
    }
}
