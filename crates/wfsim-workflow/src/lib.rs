//! Simulation of scientific workflow execution on a virtualized cluster.
//!
//! A workflow (DAG of tasks) is grouped into jobs by the [clustering engine](clustering), delayed by the
//! [overhead injector](overhead) at each pipeline stage, assigned to VMs by a pluggable [scheduler](scheduler)
//! and executed on the simulated datacenter from `wfsim-cloud` by the [workflow engine](engine).

pub mod clustering;
pub mod config;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod job;
pub mod overhead;
pub mod run_stats;
pub mod scheduler;
pub mod scheduler_resolver;
pub mod schedulers;
pub mod simulation;
pub mod task;
pub mod trace_log;
pub mod workflow;

pub use error::{Error, Result};
pub use simulation::{SimulationResult, WorkflowSimulation};

#[cfg(test)]
mod tests;
