// src/dag/manager.rs

//! The task manager: orchestrates job nodes from inside the step scheduler.
//!
//! One call to [`TaskManager::iterate`] is one orchestrator iteration:
//!
//! 1. return early if nothing is pending or running;
//! 2. retire canceled pending nodes, then start at most one ready node,
//!    respecting the worker-slot limit;
//! 3. harvest running nodes whose body finished: run their completion hook,
//!    splice the returned children into the graph, finalize them;
//! 4. prune finished branches from the unfinished view;
//! 5. drop harvested nodes from the running view.
//!
//! [`TaskManager::attach`] installs `iterate` as a step function that runs
//! once per scheduler pass.

use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::config::model::ManagerConfig;
use crate::dag::graph::JobGraph;
use crate::dag::lock;
use crate::dag::node::{JobNode, JobState};
use crate::errors::{Result, TickdagError};
use crate::step::{Schedule, TaskHandle, Wait};

/// Counts over visible nodes, for a display layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub pending: usize,
    pub running: usize,
    pub unfinished: usize,
    pub finalized: usize,
    pub failed: usize,
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} done ({} failed), {} running, {} pending",
            self.finalized, self.failed, self.running, self.pending
        )
    }
}

struct Shared {
    config: ManagerConfig,
    runtime: Handle,
    graph: Mutex<JobGraph>,
}

/// Cloneable handle to one orchestrator.
///
/// Clones share the same graph, so the application can keep a handle while
/// another one is driven by the step scheduler.
#[derive(Clone)]
pub struct TaskManager {
    shared: Arc<Shared>,
}

impl fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskManager")
            .field("config", &self.shared.config)
            .field("progress", &self.progress())
            .finish_non_exhaustive()
    }
}

impl TaskManager {
    /// Job bodies are spawned onto `runtime`.
    pub fn new(config: ManagerConfig, runtime: Handle) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                runtime,
                graph: Mutex::new(JobGraph::new()),
            }),
        }
    }

    pub fn config(&self) -> ManagerConfig {
        self.shared.config
    }

    /// Submit a node. Returns `false` if it was already submitted or has
    /// left the pending state.
    pub fn add_task(&self, node: JobNode) -> bool {
        if node.state() != JobState::Pending {
            warn!(job = %node.name(), state = %node.state(), "cannot submit a job that already ran");
            return false;
        }

        let mut graph = lock(&self.shared.graph);
        if !graph.insert(node.clone()) {
            warn!(job = %node.name(), id = %node.id(), "job submitted twice; ignoring duplicate");
            return false;
        }
        debug!(job = %node.name(), id = %node.id(), "job submitted");
        true
    }

    /// Submit several nodes in order. Returns how many were accepted.
    pub fn add_tasks(&self, nodes: impl IntoIterator<Item = JobNode>) -> usize {
        nodes
            .into_iter()
            .filter(|node| self.add_task(node.clone()))
            .count()
    }

    /// Drive this manager from `scheduler`, one iteration per pass.
    ///
    /// Cancel the returned handle to detach.
    pub fn attach<S: Schedule>(&self, scheduler: &mut S) -> TaskHandle {
        let manager = self.clone();
        scheduler
            .run_step_function(move |_ctx| {
                manager.iterate()?;
                Ok(Wait::NextTick)
            })
            .with_label("task-manager")
    }

    /// One orchestrator iteration.
    ///
    /// Completion hooks run without the graph lock held, so they may submit
    /// more work through a clone of this manager.
    pub fn iterate(&self) -> Result<()> {
        let harvest = {
            let mut graph = lock(&self.shared.graph);
            if graph.is_quiet() {
                return Ok(());
            }

            for node in graph.retire_canceled() {
                debug!(job = %node.name(), "canceled job retired before start");
            }

            let busy = graph.busy_slots();
            let slot_free = busy < self.shared.config.worker_limit;
            if let Some(node) = graph.take_first_startable(slot_free) {
                if node.launch(&self.shared.runtime) {
                    debug!(
                        job = %node.name(),
                        generation = node.generation(),
                        busy,
                        limit = self.shared.config.worker_limit,
                        "job started"
                    );
                }
                graph.push_running(node);
            }

            graph.finished_running()
        };

        for node in harvest {
            self.harvest(node)?;
        }

        let mut graph = lock(&self.shared.graph);
        let pruned = graph.prune_unfinished();
        if pruned > 0 {
            debug!(pruned, remaining = graph.unfinished().len(), "branches finished");
        }
        graph.prune_running();

        Ok(())
    }

    fn harvest(&self, node: JobNode) -> Result<()> {
        if let Some(message) = node.failure() {
            if self.shared.config.fail_fast {
                return Err(TickdagError::JobFailed {
                    job: node.name().to_string(),
                    message,
                });
            }
        }

        let children = if node.is_canceled() {
            debug!(job = %node.name(), "job canceled; follow-ups not spawned");
            Vec::new()
        } else {
            node.job().on_completed()
        };

        let mut graph = lock(&self.shared.graph);
        for child in children {
            self.splice(&mut graph, &node, child);
        }
        node.finalize();
        graph.record_finalized(&node);

        debug!(
            job = %node.name(),
            children = node.children().len(),
            failed = node.is_failed(),
            run_time = ?node.run_time(),
            "job finalized"
        );
        Ok(())
    }

    fn splice(&self, graph: &mut JobGraph, parent: &JobNode, child: JobNode) {
        if graph.contains(child.id()) || child.state() != JobState::Pending {
            warn!(
                job = %child.name(),
                parent = %parent.name(),
                "follow-up job was already submitted; ignoring"
            );
            return;
        }

        parent.attach_child(&child);
        let generation = child.generation();
        if generation > self.shared.config.generation_warning {
            warn!(
                job = %child.name(),
                parent = %parent.name(),
                generation,
                limit = self.shared.config.generation_warning,
                "spawn depth exceeds generation_warning; possible spawn cycle"
            );
        }

        debug!(job = %child.name(), parent = %parent.name(), generation, "follow-up job spawned");
        graph.insert(child);
    }

    pub fn pending_tasks(&self) -> Vec<JobNode> {
        lock(&self.shared.graph).pending().to_vec()
    }

    /// Pending nodes whose requirements and conditions currently hold.
    pub fn ready_tasks(&self) -> Vec<JobNode> {
        lock(&self.shared.graph).ready()
    }

    pub fn running_tasks(&self) -> Vec<JobNode> {
        lock(&self.shared.graph).running().to_vec()
    }

    pub fn unfinished_tasks(&self) -> Vec<JobNode> {
        lock(&self.shared.graph).unfinished().to_vec()
    }

    /// Finalized nodes whose body failed.
    pub fn failed_tasks(&self) -> Vec<JobNode> {
        lock(&self.shared.graph).failed().to_vec()
    }

    pub fn progress(&self) -> Progress {
        let graph = lock(&self.shared.graph);
        let visible = |nodes: &[JobNode]| nodes.iter().filter(|n| n.is_visible()).count();

        Progress {
            pending: visible(graph.pending()),
            running: visible(graph.running()),
            unfinished: visible(graph.unfinished()),
            finalized: graph.finalized_count(),
            failed: visible(graph.failed()),
        }
    }

    /// Every submitted branch is finished.
    pub fn is_idle(&self) -> bool {
        let graph = lock(&self.shared.graph);
        graph.unfinished().is_empty() && graph.is_quiet()
    }

    /// Cancel every node that has not been finalized yet.
    pub fn cancel_all(&self) {
        let graph = lock(&self.shared.graph);
        for node in graph.unfinished() {
            if node.state() < JobState::Finalized {
                node.cancel();
            }
        }
        info!(nodes = graph.unfinished().len(), "canceling all unfinished jobs");
    }
}
