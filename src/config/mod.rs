// src/config/mod.rs

//! Engine configuration and the demo runner's job plan.
//!
//! - [`model`] holds the serde types for `[scheduler]`, `[manager]`,
//!   `[runner]` and `[job.<name>]`.
//! - [`loader`] reads TOML from disk.
//! - [`validate`] turns a [`RawConfigFile`] into a checked [`ConfigFile`].

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, parse_str};
pub use model::{
    ConfigFile, JobConfig, ManagerConfig, RawConfigFile, RunnerConfig, SchedulerConfig,
};
