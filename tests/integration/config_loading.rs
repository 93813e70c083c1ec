// tests/integration/config_loading.rs

use std::error::Error;
use std::io::Write;

use tempfile::NamedTempFile;
use tickdag::config::{ConfigFile, load_and_validate, parse_str};
use tickdag::errors::TickdagError;
use tickdag_test_utils::builders::{JobConfigBuilder, PlanBuilder};

type TestResult = Result<(), Box<dyn Error>>;

fn write_plan(contents: &str) -> Result<NamedTempFile, Box<dyn Error>> {
    let mut file = NamedTempFile::new()?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(file)
}

fn validate(contents: &str) -> Result<ConfigFile, TickdagError> {
    ConfigFile::try_from(parse_str(contents)?)
}

#[test]
fn loads_a_full_plan_with_defaults() -> TestResult {
    let file = write_plan(
        r#"
[manager]
worker_limit = 3

[job.fetch]
duration_ms = 200

[job.unpack]
after = ["fetch"]
follow_up = ["verify"]

[job.verify]
duration_ms = 50
uses_slot = false
visible = false
"#,
    )?;

    let plan = load_and_validate(file.path())?;

    assert_eq!(plan.manager.worker_limit, 3);
    assert!(!plan.manager.fail_fast);
    assert_eq!(plan.manager.generation_warning, 32);
    assert!(!plan.scheduler.fail_fast);
    assert_eq!(plan.runner.fps, 60);
    assert_eq!(plan.runner.status_interval_ms, 1000);

    assert_eq!(plan.job["fetch"].duration_ms, 200);
    assert_eq!(plan.job["unpack"].duration_ms, 100);
    assert!(plan.job["unpack"].uses_slot);
    assert!(!plan.job["verify"].uses_slot);
    assert!(!plan.job["verify"].visible);

    assert_eq!(plan.root_jobs(), vec!["fetch", "unpack"]);
    assert_eq!(plan.parent_of("verify"), Some("unpack"));
    assert_eq!(plan.parent_of("fetch"), None);
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_and_validate("/definitely/not/here/Tickdag.toml").unwrap_err();
    assert!(matches!(err, TickdagError::IoError(_)), "{err:?}");
}

#[test]
fn broken_toml_is_reported() -> TestResult {
    let file = write_plan("[job.fetch\nduration_ms = 1")?;
    let err = load_and_validate(file.path()).unwrap_err();
    assert!(matches!(err, TickdagError::TomlError(_)), "{err:?}");
    Ok(())
}

#[test]
fn plan_without_jobs_is_rejected() {
    let err = validate("[manager]\nworker_limit = 2\n").unwrap_err();
    assert!(matches!(err, TickdagError::ConfigError(ref m) if m.contains("at least one")));
}

#[test]
fn zero_worker_limit_is_rejected() {
    let raw = PlanBuilder::new()
        .worker_limit(0)
        .with_job("a", JobConfigBuilder::new(1).build())
        .raw();
    let err = ConfigFile::try_from(raw).unwrap_err();
    assert!(matches!(err, TickdagError::ConfigError(ref m) if m.contains("worker_limit")));
}

#[test]
fn zero_fps_is_rejected() {
    let err = validate("[runner]\nfps = 0\n[job.a]\n").unwrap_err();
    assert!(matches!(err, TickdagError::ConfigError(ref m) if m.contains("fps")));
}

#[test]
fn unknown_and_self_references_are_rejected() {
    let err = validate("[job.a]\nafter = [\"ghost\"]\n").unwrap_err();
    assert!(
        matches!(err, TickdagError::ConfigError(ref m) if m.contains("unknown reference 'ghost'")),
        "{err:?}"
    );

    let err = validate("[job.a]\nfollow_up = [\"a\"]\n").unwrap_err();
    assert!(
        matches!(err, TickdagError::ConfigError(ref m) if m.contains("itself")),
        "{err:?}"
    );
}

#[test]
fn follow_up_rules_are_enforced() {
    let two_parents = PlanBuilder::new()
        .with_job("a", JobConfigBuilder::new(1).follow_up("c").build())
        .with_job("b", JobConfigBuilder::new(1).follow_up("c").build())
        .with_job("c", JobConfigBuilder::new(1).build())
        .raw();
    let err = ConfigFile::try_from(two_parents).unwrap_err();
    assert!(
        matches!(err, TickdagError::ConfigError(ref m) if m.contains("follow-up of both")),
        "{err:?}"
    );

    let gated_follow_up = PlanBuilder::new()
        .with_job("a", JobConfigBuilder::new(1).follow_up("c").build())
        .with_job("b", JobConfigBuilder::new(1).build())
        .with_job("c", JobConfigBuilder::new(1).after("b").build())
        .raw();
    let err = ConfigFile::try_from(gated_follow_up).unwrap_err();
    assert!(
        matches!(err, TickdagError::ConfigError(ref m) if m.contains("cannot declare `after`")),
        "{err:?}"
    );
}

#[test]
fn cycles_through_after_and_follow_up_are_rejected() {
    let plain = validate(
        r#"
[job.a]
after = ["b"]
[job.b]
after = ["a"]
"#,
    )
    .unwrap_err();
    assert!(matches!(plain, TickdagError::PlanCycle(_)), "{plain:?}");

    // a spawns c, and a waits for c's branch: a can never start.
    let mixed = validate(
        r#"
[job.a]
after = ["c"]
follow_up = ["c"]
[job.c]
"#,
    )
    .unwrap_err();
    assert!(matches!(mixed, TickdagError::PlanCycle(_)), "{mixed:?}");
}
