use thiserror::Error;

/// Errors reported by the workflow simulator.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed distribution, clustering, overhead or topology configuration.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Workflow graph references unknown tasks or contains a cycle.
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),

    /// Job could not get a VM able to run it.
    #[error("job {job} can not be served by vm {vm:?}: {reason}")]
    ResourceUnavailable { job: usize, vm: Option<u32>, reason: String },

    /// Unfinished jobs remain but nothing can make progress.
    #[error("dependency deadlock, stuck jobs: {stuck_jobs:?}")]
    DependencyDeadlock { stuck_jobs: Vec<usize> },

    /// Distribution produced a value outside of its support.
    #[error("{family} distribution produced invalid sample {value}")]
    Sampling { family: String, value: f64 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("failed to serialize: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
