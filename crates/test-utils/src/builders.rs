#![allow(dead_code)]

use std::collections::BTreeMap;

use tickdag::config::{
    ConfigFile, JobConfig, ManagerConfig, RawConfigFile, RunnerConfig, SchedulerConfig,
};

/// Builder for `ConfigFile` to simplify test setup.
pub struct PlanBuilder {
    config: RawConfigFile,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                scheduler: SchedulerConfig::default(),
                manager: ManagerConfig::default(),
                runner: RunnerConfig::default(),
                job: BTreeMap::new(),
            },
        }
    }

    pub fn with_job(mut self, name: &str, job: JobConfig) -> Self {
        self.config.job.insert(name.to_string(), job);
        self
    }

    pub fn worker_limit(mut self, limit: usize) -> Self {
        self.config.manager.worker_limit = limit;
        self
    }

    pub fn manager_fail_fast(mut self, fail_fast: bool) -> Self {
        self.config.manager.fail_fast = fail_fast;
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid plan from builder")
    }
}

impl Default for PlanBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `JobConfig`.
pub struct JobConfigBuilder {
    job: JobConfig,
}

impl JobConfigBuilder {
    pub fn new(duration_ms: u64) -> Self {
        Self {
            job: JobConfig {
                duration_ms,
                ..JobConfig::default()
            },
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.job.after.push(dep.to_string());
        self
    }

    pub fn follow_up(mut self, child: &str) -> Self {
        self.job.follow_up.push(child.to_string());
        self
    }

    pub fn no_slot(mut self) -> Self {
        self.job.uses_slot = false;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.job.visible = false;
        self
    }

    pub fn failing(mut self) -> Self {
        self.job.fail = true;
        self
    }

    pub fn build(self) -> JobConfig {
        self.job
    }
}
