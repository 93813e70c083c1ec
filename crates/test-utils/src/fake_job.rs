use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, bail};
use tokio::sync::Semaphore;
use tickdag::dag::{Job, JobContext, JobFuture, JobNode};

#[derive(Debug, Default)]
struct Record {
    started: Vec<String>,
    finished: Vec<String>,
    hooks: Vec<String>,
    active: usize,
    max_active: usize,
}

/// Shared log of what fake jobs did, plus a gauge of concurrently active
/// bodies.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    inner: Arc<Mutex<Record>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of jobs whose body started, in order.
    pub fn started(&self) -> Vec<String> {
        self.inner.lock().unwrap().started.clone()
    }

    /// Names of jobs whose body returned (or panicked), in order.
    pub fn finished(&self) -> Vec<String> {
        self.inner.lock().unwrap().finished.clone()
    }

    /// Names of jobs whose completion hook ran, in order.
    pub fn hooks(&self) -> Vec<String> {
        self.inner.lock().unwrap().hooks.clone()
    }

    pub fn active(&self) -> usize {
        self.inner.lock().unwrap().active
    }

    /// Highest number of bodies that were active at the same time.
    pub fn max_active(&self) -> usize {
        self.inner.lock().unwrap().max_active
    }

    fn enter(&self, name: &str) -> ActiveGuard {
        let mut record = self.inner.lock().unwrap();
        record.started.push(name.to_string());
        record.active += 1;
        record.max_active = record.max_active.max(record.active);
        ActiveGuard {
            recorder: self.clone(),
            name: name.to_string(),
        }
    }

    fn hook(&self, name: &str) {
        self.inner.lock().unwrap().hooks.push(name.to_string());
    }
}

struct ActiveGuard {
    recorder: Recorder,
    name: String,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let mut record = self
            .recorder
            .inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        record.active -= 1;
        record.finished.push(std::mem::take(&mut self.name));
    }
}

type FollowUps = Box<dyn FnOnce() -> Vec<JobNode> + Send>;

/// A configurable job for tests.
///
/// - records start / finish / completion hook in a [`Recorder`]
/// - optionally sleeps, waits on a gate, fails or panics
/// - optionally spawns follow-up nodes from its completion hook
pub struct FakeJob {
    name: String,
    recorder: Recorder,
    delay: Duration,
    gate: Option<Arc<Semaphore>>,
    fail: bool,
    panic: bool,
    follow_ups: Mutex<Option<FollowUps>>,
}

impl FakeJob {
    pub fn new(name: &str, recorder: &Recorder) -> Self {
        Self {
            name: name.to_string(),
            recorder: recorder.clone(),
            delay: Duration::ZERO,
            gate: None,
            fail: false,
            panic: false,
            follow_ups: Mutex::new(None),
        }
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Block the body until a permit is added to `gate`.
    pub fn gated(mut self, gate: &Arc<Semaphore>) -> Self {
        self.gate = Some(Arc::clone(gate));
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic = true;
        self
    }

    /// Nodes returned from the completion hook (built lazily, once).
    pub fn spawns<F>(self, follow_ups: F) -> Self
    where
        F: FnOnce() -> Vec<JobNode> + Send + 'static,
    {
        *self.follow_ups.lock().unwrap() = Some(Box::new(follow_ups));
        self
    }

    pub fn node(self) -> JobNode {
        JobNode::new(self)
    }

    async fn body(self: Arc<Self>) -> Result<()> {
        let _active = self.recorder.enter(&self.name);

        if let Some(gate) = &self.gate {
            gate.acquire().await?.forget();
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.panic {
            panic!("{} panicked on purpose", self.name);
        }
        if self.fail {
            bail!("{} exploded", self.name);
        }
        Ok(())
    }
}

impl Job for FakeJob {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(self: Arc<Self>, _ctx: JobContext) -> JobFuture {
        Box::pin(self.body())
    }

    fn on_completed(&self) -> Vec<JobNode> {
        self.recorder.hook(&self.name);
        self.follow_ups
            .lock()
            .unwrap()
            .take()
            .map(|spawn| spawn())
            .unwrap_or_default()
    }
}
