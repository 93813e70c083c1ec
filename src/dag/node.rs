// src/dag/node.rs

//! Job nodes: units of orchestrated work.
//!
//! A [`JobNode`] is a cheap, cloneable handle around a user supplied [`Job`]
//! plus the bookkeeping the task manager needs: lifecycle state, dependency
//! links, ad hoc conditions, parent back-reference, generation and the
//! children spawned on completion.
//!
//! The lifecycle state is the only field written by the background body and
//! read by the manager's pass; it is an atomic stored with release ordering
//! after the timestamps and failure message have been recorded.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use anyhow::Result;
use tokio::runtime::Handle;
use tracing::{debug, error, warn};

use super::lock;

/// Future returned by [`Job::run`].
pub type JobFuture = Pin<Box<dyn Future<Output = Result<()>> + Send + 'static>>;

/// Ad hoc readiness condition of a node.
///
/// Conditions are evaluated while the task manager holds its graph lock, so
/// they must not call back into the manager.
pub type Condition = Box<dyn Fn() -> bool + Send + Sync>;

/// A concrete piece of work the task manager can sequence.
///
/// Implementations supply the actual I/O (download, copy, checksum, ...).
pub trait Job: Send + Sync + 'static {
    /// Name used in logs and progress views.
    fn name(&self) -> &str;

    /// Body of the job. Spawned onto the manager's runtime; the manager only
    /// observes that it finished. Long bodies should poll
    /// [`JobContext::is_canceled`] to honour cancellation.
    fn run(self: Arc<Self>, ctx: JobContext) -> JobFuture;

    /// Called exactly once after the body finished (successfully or not).
    /// Returned nodes become children of this node.
    fn on_completed(&self) -> Vec<JobNode> {
        Vec::new()
    }
}

/// Process-wide unique node identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a node. Transitions only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum JobState {
    /// Submitted, waiting for its requirements and a slot.
    Pending = 0,
    /// Body has been launched.
    Started = 1,
    /// Body returned; completion hook not yet run.
    Finished = 2,
    /// Completion hook ran and its children are registered.
    Finalized = 3,
}

impl JobState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => JobState::Pending,
            1 => JobState::Started,
            2 => JobState::Finished,
            _ => JobState::Finalized,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobState::Pending => "pending",
            JobState::Started => "started",
            JobState::Finished => "finished",
            JobState::Finalized => "finalized",
        };
        f.write_str(s)
    }
}

/// What a running body gets to see of its node.
#[derive(Debug, Clone)]
pub struct JobContext {
    id: JobId,
    name: String,
    canceled: Arc<AtomicBool>,
}

impl JobContext {
    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct Timestamps {
    started_at: Option<Instant>,
    finished_at: Option<Instant>,
}

#[derive(Debug, Default)]
struct Links {
    parent: Option<Weak<NodeInner>>,
    children: Vec<JobNode>,
    generation: u32,
}

struct NodeInner {
    id: JobId,
    name: String,
    job: Arc<dyn Job>,
    state: AtomicU8,
    canceled: Arc<AtomicBool>,
    branch_done: AtomicBool,
    visible: bool,
    uses_slot: bool,
    requires: Vec<JobNode>,
    conditions: Vec<Condition>,
    timestamps: Mutex<Timestamps>,
    failure: Mutex<Option<String>>,
    links: Mutex<Links>,
}

/// Handle to one job node. Clones refer to the same node.
#[derive(Clone)]
pub struct JobNode {
    inner: Arc<NodeInner>,
}

impl fmt::Debug for JobNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobNode")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("generation", &self.generation())
            .field("uses_slot", &self.inner.uses_slot)
            .finish_non_exhaustive()
    }
}

impl PartialEq for JobNode {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for JobNode {}

impl JobNode {
    /// Start building a node around `job`.
    pub fn builder<J: Job>(job: J) -> JobNodeBuilder {
        JobNodeBuilder::new(Arc::new(job))
    }

    /// Node with no requirements, consuming a worker slot.
    pub fn new<J: Job>(job: J) -> Self {
        Self::builder(job).build()
    }

    pub fn id(&self) -> JobId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn job(&self) -> &Arc<dyn Job> {
        &self.inner.job
    }

    pub fn state(&self) -> JobState {
        JobState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub fn is_visible(&self) -> bool {
        self.inner.visible
    }

    pub fn uses_slot(&self) -> bool {
        self.inner.uses_slot
    }

    /// Nodes whose branches must be finished before this one may start.
    pub fn requires(&self) -> &[JobNode] {
        &self.inner.requires
    }

    /// Depth in the spawn tree; roots are generation 0.
    pub fn generation(&self) -> u32 {
        lock(&self.inner.links).generation
    }

    /// The node whose completion spawned this one, while it is still alive.
    pub fn parent(&self) -> Option<JobNode> {
        let links = lock(&self.inner.links);
        links
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| JobNode { inner })
    }

    pub fn children(&self) -> Vec<JobNode> {
        lock(&self.inner.links).children.clone()
    }

    pub fn started_at(&self) -> Option<Instant> {
        lock(&self.inner.timestamps).started_at
    }

    pub fn finished_at(&self) -> Option<Instant> {
        lock(&self.inner.timestamps).finished_at
    }

    /// Wall-clock run time of the body, once it has finished.
    pub fn run_time(&self) -> Option<Duration> {
        let ts = *lock(&self.inner.timestamps);
        match (ts.started_at, ts.finished_at) {
            (Some(start), Some(end)) => Some(end.saturating_duration_since(start)),
            _ => None,
        }
    }

    /// Failure message recorded for the body, if it failed.
    pub fn failure(&self) -> Option<String> {
        lock(&self.inner.failure).clone()
    }

    pub fn is_failed(&self) -> bool {
        lock(&self.inner.failure).is_some()
    }

    /// Request cancellation. A node that has not started yet will never
    /// start; a running body sees it through [`JobContext::is_canceled`].
    pub fn cancel(&self) {
        self.inner.canceled.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::Acquire)
    }

    /// Every required branch is finished and every condition holds.
    pub fn can_run(&self) -> bool {
        self.inner.requires.iter().all(JobNode::branch_finished)
            && self.inner.conditions.iter().all(|condition| condition())
    }

    /// This node is finalized and so is every node it spawned, transitively.
    ///
    /// A finalized node never gains children, so a positive answer is
    /// cached per node.
    pub fn branch_finished(&self) -> bool {
        if self.inner.branch_done.load(Ordering::Acquire) {
            return true;
        }

        let mut stack = vec![self.clone()];
        while let Some(node) = stack.pop() {
            if node.inner.branch_done.load(Ordering::Acquire) {
                continue;
            }
            if node.state() != JobState::Finalized {
                return false;
            }
            stack.extend(node.children());
        }

        self.inner.branch_done.store(true, Ordering::Release);
        true
    }

    /// Pending -> Started, then spawn the body onto `runtime`.
    ///
    /// Returns `false` (and does nothing) if the node was already launched.
    pub(crate) fn launch(&self, runtime: &Handle) -> bool {
        if !self.advance(JobState::Pending, JobState::Started) {
            warn!(job = %self.name(), state = %self.state(), "job launched twice; ignoring");
            return false;
        }
        lock(&self.inner.timestamps).started_at = Some(Instant::now());

        let node = self.clone();
        let job = Arc::clone(&self.inner.job);
        let ctx = JobContext {
            id: self.inner.id,
            name: self.inner.name.clone(),
            canceled: Arc::clone(&self.inner.canceled),
        };

        runtime.spawn(async move {
            // The body runs in its own task so that a panic is contained to it.
            let body = tokio::spawn(job.run(ctx));
            let failure = match body.await {
                Ok(Ok(())) => None,
                Ok(Err(err)) => Some(format!("{err:#}")),
                Err(join_err) if join_err.is_panic() => {
                    Some(format!("job body panicked: {join_err}"))
                }
                Err(join_err) => Some(format!("job body aborted: {join_err}")),
            };
            node.finish(failure);
        });

        true
    }

    /// Pending -> Finished without running the body (canceled before start).
    pub(crate) fn skip(&self) -> bool {
        if !self.advance(JobState::Pending, JobState::Finished) {
            return false;
        }
        lock(&self.inner.timestamps).finished_at = Some(Instant::now());
        debug!(job = %self.name(), "canceled before start; skipping body");
        true
    }

    fn finish(&self, failure: Option<String>) {
        match failure.as_deref() {
            Some(message) => error!(job = %self.name(), error = %message, "job failed"),
            None => debug!(job = %self.name(), "job body finished"),
        }

        *lock(&self.inner.failure) = failure;
        lock(&self.inner.timestamps).finished_at = Some(Instant::now());
        self.advance(JobState::Started, JobState::Finished);
    }

    /// Finished -> Finalized. Children must already be attached.
    pub(crate) fn finalize(&self) -> bool {
        self.advance(JobState::Finished, JobState::Finalized)
    }

    /// Register `child` as spawned by this node.
    pub(crate) fn attach_child(&self, child: &JobNode) {
        let generation = self.generation().saturating_add(1);
        {
            let mut links = lock(&child.inner.links);
            links.parent = Some(Arc::downgrade(&self.inner));
            links.generation = generation;
        }
        lock(&self.inner.links).children.push(child.clone());
    }

    fn advance(&self, from: JobState, to: JobState) -> bool {
        self.inner
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// Additive builder for [`JobNode`]. Requirements and conditions can only
/// be added, so dependency graphs grow monotonically before submission.
pub struct JobNodeBuilder {
    job: Arc<dyn Job>,
    name: Option<String>,
    requires: Vec<JobNode>,
    conditions: Vec<Condition>,
    uses_slot: bool,
    visible: bool,
}

impl JobNodeBuilder {
    fn new(job: Arc<dyn Job>) -> Self {
        Self {
            job,
            name: None,
            requires: Vec::new(),
            conditions: Vec::new(),
            uses_slot: true,
            visible: true,
        }
    }

    /// Override the diagnostic name (defaults to [`Job::name`]).
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Wait for `node`'s whole branch before starting.
    pub fn after(mut self, node: &JobNode) -> Self {
        self.requires.push(node.clone());
        self
    }

    pub fn after_all<'a>(mut self, nodes: impl IntoIterator<Item = &'a JobNode>) -> Self {
        self.requires.extend(nodes.into_iter().cloned());
        self
    }

    /// Only start while `condition` holds.
    pub fn with_condition<F>(mut self, condition: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.conditions.push(Box::new(condition));
        self
    }

    /// Whether the node counts against the manager's worker limit.
    pub fn uses_slot(mut self, uses_slot: bool) -> Self {
        self.uses_slot = uses_slot;
        self
    }

    /// Whether the node shows up in progress summaries.
    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = visible;
        self
    }

    pub fn build(self) -> JobNode {
        let id = JobId(NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed));
        let name = self.name.unwrap_or_else(|| self.job.name().to_string());

        JobNode {
            inner: Arc::new(NodeInner {
                id,
                name,
                job: self.job,
                state: AtomicU8::new(JobState::Pending as u8),
                canceled: Arc::new(AtomicBool::new(false)),
                branch_done: AtomicBool::new(false),
                visible: self.visible,
                uses_slot: self.uses_slot,
                requires: self.requires,
                conditions: self.conditions,
                timestamps: Mutex::new(Timestamps::default()),
                failure: Mutex::new(None),
                links: Mutex::new(Links::default()),
            }),
        }
    }
}
