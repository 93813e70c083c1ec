// src/exec/plan.rs

//! Build job nodes from a validated plan.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::debug;

use crate::config::model::ConfigFile;
use crate::dag::JobNode;
use crate::errors::{Result, TickdagError};
use crate::exec::simulated::SimulatedJob;

/// Build the node for job `name`, requiring `requires`.
pub fn build_node(plan: &Arc<ConfigFile>, name: &str, requires: Vec<JobNode>) -> Result<JobNode> {
    let config = plan
        .job
        .get(name)
        .ok_or_else(|| TickdagError::ConfigError(format!("unknown job '{name}'")))?;

    let node = JobNode::builder(SimulatedJob::new(name, config.clone(), Arc::clone(plan)))
        .after_all(&requires)
        .uses_slot(config.uses_slot)
        .visible(config.visible)
        .build();
    Ok(node)
}

/// Build one node per root job (jobs nobody lists as a follow-up), with
/// requirements before the jobs that need them.
///
/// `after` on a follow-up job is expressed as a requirement on the branch of
/// the root that eventually spawns it.
pub fn build_root_nodes(plan: &Arc<ConfigFile>) -> Result<Vec<JobNode>> {
    let mut builder = RootBuilder {
        plan,
        built: HashMap::new(),
        visiting: HashSet::new(),
        order: Vec::new(),
    };

    for root in plan.root_jobs() {
        builder.build(root)?;
    }

    debug!(roots = builder.order.len(), "built root job nodes");
    Ok(builder.order)
}

struct RootBuilder<'a> {
    plan: &'a Arc<ConfigFile>,
    built: HashMap<String, JobNode>,
    visiting: HashSet<String>,
    order: Vec<JobNode>,
}

impl RootBuilder<'_> {
    fn build(&mut self, name: &str) -> Result<JobNode> {
        if let Some(node) = self.built.get(name) {
            return Ok(node.clone());
        }
        if !self.visiting.insert(name.to_string()) {
            return Err(TickdagError::PlanCycle(format!(
                "job '{name}' requires itself through `after`"
            )));
        }

        let after = self
            .plan
            .job
            .get(name)
            .map(|job| job.after.clone())
            .unwrap_or_default();

        let mut requires = Vec::with_capacity(after.len());
        for dep in after.iter() {
            let anchor = root_ancestor(self.plan, dep)?;
            requires.push(self.build(&anchor)?);
        }

        let node = build_node(self.plan, name, requires)?;
        self.visiting.remove(name);
        self.built.insert(name.to_string(), node.clone());
        self.order.push(node.clone());
        Ok(node)
    }
}

/// The root job whose spawn tree contains `name`.
fn root_ancestor(plan: &ConfigFile, name: &str) -> Result<String> {
    let mut current = name;
    for _ in 0..=plan.job.len() {
        match plan.parent_of(current) {
            Some(parent) => current = parent,
            None => return Ok(current.to_string()),
        }
    }
    Err(TickdagError::PlanCycle(format!(
        "follow-up chain of job '{name}' never reaches a root"
    )))
}
