// src/exec/mod.rs

//! Job execution for the demo runner.
//!
//! - [`simulated`] provides [`SimulatedJob`], a [`Job`](crate::dag::Job)
//!   whose body sleeps for a configured duration and optionally fails.
//! - [`plan`] turns a validated plan file into job nodes, wiring `after`
//!   requirements and `follow_up` spawning.

pub mod plan;
pub mod simulated;

pub use plan::{build_node, build_root_nodes};
pub use simulated::SimulatedJob;
