// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod step;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use tracing::{error, info};

use crate::cli::CliArgs;
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::dag::TaskManager;
use crate::engine::{FrameLoop, LoopExit};
use crate::exec::build_root_nodes;
use crate::step::{Schedule, StepScheduler};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - plan loading
/// - step scheduler + task manager
/// - a periodic progress line
/// - the frame loop and Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let plan = Arc::new(load_and_validate(&config_path)?);

    if args.dry_run {
        print_dry_run(&plan);
        return Ok(());
    }

    let manager = TaskManager::new(plan.manager, tokio::runtime::Handle::current());
    let roots = build_root_nodes(&plan)?;
    info!(
        roots = roots.len(),
        jobs = plan.job.len(),
        worker_limit = plan.manager.worker_limit,
        "submitting plan"
    );
    manager.add_tasks(roots);

    let mut scheduler = StepScheduler::new(plan.scheduler);
    let driver = manager.attach(&mut scheduler);

    let status = manager.clone();
    scheduler
        .every(
            Duration::from_millis(plan.runner.status_interval_ms),
            move |_ctx| {
                info!(progress = %status.progress(), "status");
                Ok(())
            },
            false,
        )
        .with_label("status");

    let fps = args.fps.unwrap_or(plan.runner.fps);
    let mut frames = FrameLoop::new(scheduler, fps);

    let idle = manager.clone();
    let stopped = driver.clone();
    let outcome = frames
        .run_until(|_| idle.is_idle() || stopped.is_finished(), async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await;
    let exit = match outcome {
        Ok(exit) => exit,
        Err(err) => {
            manager.cancel_all();
            return Err(err.into());
        }
    };

    if exit == LoopExit::Interrupted {
        manager.cancel_all();
        info!(progress = %manager.progress(), "interrupted; remaining jobs canceled");
        return Ok(());
    }

    if !manager.is_idle() {
        bail!(
            "task manager stopped before the plan finished ({})",
            manager.progress()
        );
    }

    let failed = manager.failed_tasks();
    info!(
        progress = %manager.progress(),
        elapsed = ?frames.scheduler().elapsed(),
        "plan finished"
    );

    if !failed.is_empty() {
        for node in &failed {
            error!(
                job = %node.name(),
                error = %node.failure().unwrap_or_default(),
                "job failed"
            );
        }
        let names: Vec<_> = failed.iter().map(|n| n.name().to_string()).collect();
        bail!("{} job(s) failed: {}", failed.len(), names.join(", "));
    }

    Ok(())
}

/// Simple dry-run output: print settings, jobs and their relations.
fn print_dry_run(plan: &ConfigFile) {
    println!("tickdag dry-run");
    println!("  scheduler.fail_fast = {}", plan.scheduler.fail_fast);
    println!("  manager.worker_limit = {}", plan.manager.worker_limit);
    println!("  manager.fail_fast = {}", plan.manager.fail_fast);
    println!("  runner.fps = {}", plan.runner.fps);
    println!();

    println!("roots: {:?}", plan.root_jobs());
    println!("jobs ({}):", plan.job.len());
    for (name, job) in plan.job.iter() {
        println!("  - {name}");
        println!("      duration_ms: {}", job.duration_ms);
        if !job.after.is_empty() {
            println!("      after: {:?}", job.after);
        }
        if !job.follow_up.is_empty() {
            println!("      follow_up: {:?}", job.follow_up);
        }
        if let Some(parent) = plan.parent_of(name) {
            println!("      spawned by: {parent}");
        }
        if !job.uses_slot {
            println!("      uses_slot: false");
        }
        if !job.visible {
            println!("      visible: false");
        }
        if job.fail {
            println!("      fail: true");
        }
    }
}
