// src/config/validate.rs

use std::collections::HashMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{Result, TickdagError};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::TickdagError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(
            raw.scheduler,
            raw.manager,
            raw.runner,
            raw.job,
        ))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_jobs(cfg)?;
    validate_global_config(cfg)?;
    validate_job_references(cfg)?;
    validate_follow_ups(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_jobs(cfg: &RawConfigFile) -> Result<()> {
    if cfg.job.is_empty() {
        return Err(TickdagError::ConfigError(
            "plan must contain at least one [job.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawConfigFile) -> Result<()> {
    if cfg.manager.worker_limit == 0 {
        return Err(TickdagError::ConfigError(
            "[manager].worker_limit must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.runner.fps == 0 {
        return Err(TickdagError::ConfigError(
            "[runner].fps must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_job_references(cfg: &RawConfigFile) -> Result<()> {
    for (name, job) in cfg.job.iter() {
        for (field, refs) in [("after", &job.after), ("follow_up", &job.follow_up)] {
            for other in refs.iter() {
                if !cfg.job.contains_key(other) {
                    return Err(TickdagError::ConfigError(format!(
                        "job '{}' has unknown reference '{}' in `{}`",
                        name, other, field
                    )));
                }
                if other == name {
                    return Err(TickdagError::ConfigError(format!(
                        "job '{}' cannot reference itself in `{}`",
                        name, field
                    )));
                }
            }
        }
    }
    Ok(())
}

/// Follow-up jobs are spawned by exactly one parent and are gated only by
/// that parent, so they may not declare `after` themselves.
fn validate_follow_ups(cfg: &RawConfigFile) -> Result<()> {
    let mut parents: HashMap<&str, &str> = HashMap::new();

    for (name, job) in cfg.job.iter() {
        for child in job.follow_up.iter() {
            if let Some(previous) = parents.insert(child.as_str(), name.as_str()) {
                return Err(TickdagError::ConfigError(format!(
                    "job '{}' is a follow-up of both '{}' and '{}'",
                    child, previous, name
                )));
            }
        }
    }

    for (child, parent) in parents.iter() {
        if let Some(job) = cfg.job.get(*child) {
            if !job.after.is_empty() {
                return Err(TickdagError::ConfigError(format!(
                    "follow-up job '{}' (spawned by '{}') cannot declare `after`",
                    child, parent
                )));
            }
        }
    }

    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    // Edge direction: prerequisite/parent -> job.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.job.keys() {
        graph.add_node(name.as_str());
    }

    for (name, job) in cfg.job.iter() {
        for dep in job.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
        for child in job.follow_up.iter() {
            graph.add_edge(name.as_str(), child.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(TickdagError::PlanCycle(format!(
                "cycle detected in job plan involving job '{}'",
                node
            )))
        }
    }
}
