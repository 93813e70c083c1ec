// src/dag/graph.rs

//! The orchestrator's views over the submitted job nodes.

use std::collections::HashSet;

use crate::dag::node::{JobId, JobNode, JobState};

/// Pending, running and unfinished views over one node set.
///
/// A node is in exactly one of `pending` / `running` until it leaves both;
/// `unfinished` keeps it until its whole branch is finalized.
#[derive(Debug, Default)]
pub struct JobGraph {
    pending: Vec<JobNode>,
    running: Vec<JobNode>,
    unfinished: Vec<JobNode>,
    known: HashSet<JobId>,
    finalized: usize,
    failed: Vec<JobNode>,
}

impl JobGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: JobId) -> bool {
        self.known.contains(&id)
    }

    /// Register a node. Returns `false` if it was already submitted.
    pub fn insert(&mut self, node: JobNode) -> bool {
        if !self.known.insert(node.id()) {
            return false;
        }
        self.unfinished.push(node.clone());
        self.pending.push(node);
        true
    }

    pub fn pending(&self) -> &[JobNode] {
        &self.pending
    }

    pub fn running(&self) -> &[JobNode] {
        &self.running
    }

    pub fn unfinished(&self) -> &[JobNode] {
        &self.unfinished
    }

    /// Number of visible nodes that went through the whole lifecycle.
    pub fn finalized_count(&self) -> usize {
        self.finalized
    }

    /// Finalized nodes whose body failed.
    pub fn failed(&self) -> &[JobNode] {
        &self.failed
    }

    /// Pending nodes that could start right now, slots permitting.
    pub fn ready(&self) -> Vec<JobNode> {
        self.pending
            .iter()
            .filter(|node| !node.is_canceled() && node.can_run())
            .cloned()
            .collect()
    }

    /// Launched running nodes that hold a worker slot.
    ///
    /// Canceled nodes retired before start sit in `running` until harvest
    /// but never had a body, so they do not count.
    pub fn busy_slots(&self) -> usize {
        self.running
            .iter()
            .filter(|node| node.uses_slot() && node.started_at().is_some())
            .count()
    }

    /// Nothing pending and nothing running.
    pub fn is_quiet(&self) -> bool {
        self.pending.is_empty() && self.running.is_empty()
    }

    /// Move canceled pending nodes to running as finished without a body.
    pub fn retire_canceled(&mut self) -> Vec<JobNode> {
        let (canceled, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(JobNode::is_canceled);
        self.pending = kept;

        for node in &canceled {
            node.skip();
        }
        self.running.extend(canceled.iter().cloned());
        canceled
    }

    /// Remove and return the first pending node that may start.
    ///
    /// With `slot_free == false` only nodes that do not consume a slot are
    /// eligible.
    pub fn take_first_startable(&mut self, slot_free: bool) -> Option<JobNode> {
        let index = self.pending.iter().position(|node| {
            (slot_free || !node.uses_slot()) && !node.is_canceled() && node.can_run()
        })?;
        Some(self.pending.remove(index))
    }

    pub fn push_running(&mut self, node: JobNode) {
        self.running.push(node);
    }

    /// Running nodes whose body has finished but that are not finalized yet.
    pub fn finished_running(&self) -> Vec<JobNode> {
        self.running
            .iter()
            .filter(|node| node.state() == JobState::Finished)
            .cloned()
            .collect()
    }

    pub fn record_finalized(&mut self, node: &JobNode) {
        if node.is_visible() {
            self.finalized += 1;
        }
        if node.is_failed() {
            self.failed.push(node.clone());
        }
    }

    /// Drop nodes whose branch is finished from the unfinished view.
    pub fn prune_unfinished(&mut self) -> usize {
        let before = self.unfinished.len();
        self.unfinished.retain(|node| !node.branch_finished());
        before - self.unfinished.len()
    }

    /// Drop harvested nodes from the running view.
    ///
    /// A body that finishes after this pass's harvest stays until the next
    /// one, so no node ever leaves without being finalized.
    pub fn prune_running(&mut self) {
        self.running
            .retain(|node| node.state() != JobState::Finalized);
    }
}
