// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

/// Raw plan file as read from TOML, before validation.
///
/// ```toml
/// [scheduler]
/// fail_fast = false
///
/// [manager]
/// worker_limit = 2
///
/// [runner]
/// fps = 60
///
/// [job.fetch]
/// duration_ms = 200
///
/// [job.unpack]
/// after = ["fetch"]
/// follow_up = ["verify"]
///
/// [job.verify]
/// duration_ms = 50
/// ```
///
/// All sections are optional and have reasonable defaults; validation
/// requires at least one job.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub manager: ManagerConfig,

    #[serde(default)]
    pub runner: RunnerConfig,

    /// All jobs from `[job.<name>]`, keyed by job name.
    #[serde(default)]
    pub job: BTreeMap<String, JobConfig>,
}

/// Validated plan. Build it with `ConfigFile::try_from(raw)`.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub scheduler: SchedulerConfig,
    pub manager: ManagerConfig,
    pub runner: RunnerConfig,
    pub job: BTreeMap<String, JobConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        scheduler: SchedulerConfig,
        manager: ManagerConfig,
        runner: RunnerConfig,
        job: BTreeMap<String, JobConfig>,
    ) -> Self {
        Self {
            scheduler,
            manager,
            runner,
            job,
        }
    }

    /// Jobs submitted at startup: every job that is nobody's follow-up.
    pub fn root_jobs(&self) -> Vec<&str> {
        self.job
            .keys()
            .filter(|name| self.parent_of(name).is_none())
            .map(String::as_str)
            .collect()
    }

    /// The job that lists `name` in its `follow_up`, if any.
    pub fn parent_of(&self, name: &str) -> Option<&str> {
        self.job
            .iter()
            .find(|(_, job)| job.follow_up.iter().any(|f| f == name))
            .map(|(parent, _)| parent.as_str())
    }
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct SchedulerConfig {
    /// Propagate pending-task failures out of `update` instead of logging
    /// them. Meant for test harnesses.
    #[serde(default)]
    pub fail_fast: bool,
}

/// `[manager]` section.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct ManagerConfig {
    /// Maximum number of running slot-consuming jobs.
    #[serde(default = "default_worker_limit")]
    pub worker_limit: usize,

    /// Turn a failed job body into an error of the orchestrator pass.
    #[serde(default)]
    pub fail_fast: bool,

    /// Generation above which spawned jobs are reported as a likely spawn
    /// cycle.
    #[serde(default = "default_generation_warning")]
    pub generation_warning: u32,
}

fn default_worker_limit() -> usize {
    2
}

fn default_generation_warning() -> u32 {
    32
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            worker_limit: default_worker_limit(),
            fail_fast: false,
            generation_warning: default_generation_warning(),
        }
    }
}

impl ManagerConfig {
    pub fn with_worker_limit(worker_limit: usize) -> Self {
        Self {
            worker_limit,
            ..Self::default()
        }
    }
}

/// `[runner]` section, only used by the demo binary.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RunnerConfig {
    /// Host loop frequency.
    #[serde(default = "default_fps")]
    pub fps: u32,

    /// How often the runner logs a progress line.
    #[serde(default = "default_status_interval_ms")]
    pub status_interval_ms: u64,
}

fn default_fps() -> u32 {
    60
}

fn default_status_interval_ms() -> u64 {
    1000
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            status_interval_ms: default_status_interval_ms(),
        }
    }
}

/// `[job.<name>]` section: one simulated job.
#[derive(Debug, Clone, Deserialize)]
pub struct JobConfig {
    /// Jobs whose whole branch must finish before this one may start.
    #[serde(default)]
    pub after: Vec<String>,

    /// Jobs spawned as children when this one completes.
    #[serde(default)]
    pub follow_up: Vec<String>,

    /// How long the simulated body takes.
    #[serde(default = "default_duration_ms")]
    pub duration_ms: u64,

    /// Whether the job occupies a worker slot while running.
    #[serde(default = "default_true")]
    pub uses_slot: bool,

    /// Whether the job shows up in progress summaries.
    #[serde(default = "default_true")]
    pub visible: bool,

    /// Make the simulated body fail.
    #[serde(default)]
    pub fail: bool,
}

fn default_duration_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            after: Vec::new(),
            follow_up: Vec::new(),
            duration_ms: default_duration_ms(),
            uses_slot: true,
            visible: true,
            fail: false,
        }
    }
}
