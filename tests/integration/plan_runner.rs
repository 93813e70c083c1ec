// tests/integration/plan_runner.rs

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tickdag::cli::{CliArgs, LogLevel};
use tickdag::config::ManagerConfig;
use tickdag::config::loader::DEFAULT_CONFIG_FILE;
use tickdag::dag::{JobNode, JobState, TaskManager};
use tickdag::engine::{FrameLoop, LoopExit};
use tickdag::exec::build_root_nodes;
use tickdag::logging::resolve_level;
use tickdag::step::StepScheduler;
use tickdag_test_utils::builders::{JobConfigBuilder, PlanBuilder};
use tickdag_test_utils::{init_tracing, with_timeout};
use tokio::runtime::Handle;

type TestResult = Result<(), Box<dyn Error>>;

fn find<'a>(nodes: &'a [JobNode], name: &str) -> &'a JobNode {
    nodes
        .iter()
        .find(|n| n.name() == name)
        .unwrap_or_else(|| panic!("no node named {name}"))
}

#[test]
fn root_nodes_follow_the_plan() -> TestResult {
    let plan = Arc::new(
        PlanBuilder::new()
            .with_job("fetch", JobConfigBuilder::new(5).build())
            .with_job(
                "unpack",
                JobConfigBuilder::new(5).after("fetch").follow_up("verify").build(),
            )
            .with_job("verify", JobConfigBuilder::new(5).no_slot().hidden().build())
            .with_job("report", JobConfigBuilder::new(5).after("verify").build())
            .build(),
    );

    let roots = build_root_nodes(&plan)?;
    let names: Vec<_> = roots.iter().map(|n| n.name().to_string()).collect();
    assert_eq!(names, vec!["fetch", "unpack", "report"]);

    let unpack = find(&roots, "unpack");
    assert_eq!(unpack.requires(), &[find(&roots, "fetch").clone()]);

    // `after` on a follow-up waits for the branch of the root that spawns it.
    let report = find(&roots, "report");
    assert_eq!(report.requires(), &[unpack.clone()]);
    Ok(())
}

#[tokio::test]
async fn plan_runs_to_completion_through_the_frame_loop() -> TestResult {
    init_tracing();
    let plan = Arc::new(
        PlanBuilder::new()
            .worker_limit(2)
            .with_job("fetch", JobConfigBuilder::new(5).build())
            .with_job(
                "unpack",
                JobConfigBuilder::new(5).after("fetch").follow_up("verify").build(),
            )
            .with_job("verify", JobConfigBuilder::new(5).no_slot().build())
            .with_job("report", JobConfigBuilder::new(5).after("verify").build())
            .build(),
    );

    let manager = TaskManager::new(plan.manager, Handle::current());
    let roots = build_root_nodes(&plan)?;
    manager.add_tasks(roots.clone());

    let mut scheduler = StepScheduler::new(plan.scheduler);
    manager.attach(&mut scheduler);
    let mut frames = FrameLoop::new(scheduler, 500);

    let exit = with_timeout(frames.run_until(|_| manager.is_idle(), std::future::pending()))
        .await?;
    assert_eq!(exit, LoopExit::Done);
    assert!(frames.scheduler().ticks() > 0);

    let unpack = find(&roots, "unpack");
    let children = unpack.children();
    assert_eq!(children.len(), 1);
    let verify = &children[0];
    assert_eq!(verify.name(), "verify");
    assert_eq!(verify.generation(), 1);
    assert!(!verify.uses_slot());
    assert!(verify.run_time().is_some());

    let report = find(&roots, "report");
    let verify_done = verify.finished_at().expect("verify finished");
    let report_start = report.started_at().expect("report started");
    assert!(report_start >= verify_done);

    for node in roots.iter().chain(children.iter()) {
        assert_eq!(node.state(), JobState::Finalized, "{}", node.name());
    }
    assert!(manager.failed_tasks().is_empty());
    Ok(())
}

#[tokio::test]
async fn simulated_failure_is_recorded() -> TestResult {
    let plan = Arc::new(
        PlanBuilder::new()
            .with_job("flaky", JobConfigBuilder::new(1).failing().build())
            .build(),
    );

    let manager = TaskManager::new(ManagerConfig::default(), Handle::current());
    manager.add_tasks(build_root_nodes(&plan)?);

    let mut scheduler = StepScheduler::default();
    manager.attach(&mut scheduler);
    let mut frames = FrameLoop::new(scheduler, 500);
    with_timeout(frames.run_until(|_| manager.is_idle(), std::future::pending())).await?;

    let failed = manager.failed_tasks();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].name(), "flaky");
    assert!(
        failed[0]
            .failure()
            .unwrap_or_default()
            .contains("simulated failure")
    );
    Ok(())
}

#[tokio::test]
async fn shutdown_interrupts_the_frame_loop() -> TestResult {
    let mut frames = FrameLoop::new(StepScheduler::default(), 1000);
    assert_eq!(frames.frame(), Duration::from_millis(1));

    let exit = with_timeout(frames.run_until(|_| false, async {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }))
    .await?;
    assert_eq!(exit, LoopExit::Interrupted);
    Ok(())
}

#[tokio::test]
async fn canceled_simulated_job_stops_early() -> TestResult {
    let plan = Arc::new(
        PlanBuilder::new()
            .with_job("slow", JobConfigBuilder::new(60_000).follow_up("never").build())
            .with_job("never", JobConfigBuilder::new(1).build())
            .build(),
    );

    let manager = TaskManager::new(ManagerConfig::default(), Handle::current());
    let roots = build_root_nodes(&plan)?;
    manager.add_tasks(roots.clone());

    let mut scheduler = StepScheduler::default();
    manager.attach(&mut scheduler);
    let mut frames = FrameLoop::new(scheduler, 500);

    let slow = roots[0].clone();
    let watched = slow.clone();
    let exit = with_timeout(frames.run_until(
        move |_| {
            if watched.state() == JobState::Started {
                watched.cancel();
            }
            manager.is_idle()
        },
        std::future::pending(),
    ))
    .await?;

    assert_eq!(exit, LoopExit::Done);
    assert_eq!(slow.state(), JobState::Finalized);
    assert!(slow.children().is_empty());
    Ok(())
}

#[test]
fn log_level_priority_is_cli_then_env_then_info() {
    assert_eq!(
        resolve_level(Some(LogLevel::Trace), Some("error")),
        tracing::Level::TRACE
    );
    assert_eq!(resolve_level(None, Some(" Debug ")), tracing::Level::DEBUG);
    assert_eq!(resolve_level(None, Some("warning")), tracing::Level::WARN);
    assert_eq!(resolve_level(None, Some("loud")), tracing::Level::INFO);
    assert_eq!(resolve_level(None, None), tracing::Level::INFO);
}

#[test]
fn cli_defaults_to_the_plan_in_the_working_directory() {
    let args = CliArgs::parse_from(["tickdag"]);
    assert_eq!(args.config, DEFAULT_CONFIG_FILE);
    assert!(args.fps.is_none());
    assert!(!args.dry_run);
}
