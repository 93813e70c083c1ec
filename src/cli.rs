// src/cli.rs

//! CLI argument parsing for the demo runner using `clap`.

use clap::{Parser, ValueEnum};

use crate::config::loader::DEFAULT_CONFIG_FILE;

/// Command-line arguments for `tickdag`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "tickdag",
    version,
    about = "Drive a plan of simulated jobs through the tick scheduler and task manager.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the plan file (TOML).
    ///
    /// Default: `Tickdag.toml` in the current working directory.
    #[arg(long, value_name = "PATH", default_value = DEFAULT_CONFIG_FILE)]
    pub config: String,

    /// Frames per second of the host loop. Overrides `[runner].fps`.
    #[arg(long, value_name = "N")]
    pub fps: Option<u32>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `TICKDAG_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the plan, but don't run any jobs.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
