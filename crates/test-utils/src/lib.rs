pub mod builders;
pub mod fake_job;

use std::sync::Once;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tickdag::step::StepScheduler;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: Once = Once::new();

/// Initialise tracing for tests.
///
/// - Uses `with_test_writer()`, so logs are captured per-test.
/// - The Rust test harness only prints captured output for **failing** tests
///   (unless you run with `-- --nocapture`).
///
/// Enable levels with e.g.:
/// `RUST_LOG=tickdag=debug cargo test`
pub fn init_tracing() {
    INIT.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        fmt()
            .with_env_filter(filter)
            .with_test_writer() // print only for failing tests unless --nocapture
            .with_target(true)
            .init();
    });
}

/// Run a future with a 5-second timeout.
#[allow(dead_code)]
pub async fn with_timeout<F, T>(f: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(std::time::Duration::from_secs(5), f)
        .await
        .expect("Test timed out after 5 seconds")
}

/// Give spawned job bodies a chance to run to their next await point.
pub async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// One scheduler pass with a fixed `dt`, then [`settle`].
pub async fn pump(scheduler: &mut StepScheduler, dt: Duration) -> Result<()> {
    scheduler.update(Some(dt))?;
    settle().await;
    Ok(())
}

/// Pump until `done` holds after a pass. Returns the number of passes used.
pub async fn drive_until<F>(
    scheduler: &mut StepScheduler,
    dt: Duration,
    max_passes: usize,
    mut done: F,
) -> Result<usize>
where
    F: FnMut() -> bool,
{
    for pass in 1..=max_passes {
        pump(scheduler, dt).await?;
        if done() {
            return Ok(pass);
        }
    }
    Err(anyhow!("condition not reached after {max_passes} passes"))
}
