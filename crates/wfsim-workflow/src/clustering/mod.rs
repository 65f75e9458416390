//! Task clustering: grouping workflow tasks into jobs.

mod balanced;
mod horizontal;
mod vertical;

use std::collections::{BTreeMap, BTreeSet};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::job::{Job, JobStatus};
use crate::workflow::{topological_sort, Workflow};

pub use balanced::BalancedClustering;
pub use horizontal::HorizontalClustering;
pub use vertical::VerticalClustering;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusteringMethod {
    None,
    Horizontal,
    Vertical,
    Balanced,
}

impl Default for ClusteringMethod {
    fn default() -> Self {
        ClusteringMethod::None
    }
}

/// Clustering configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringParameters {
    pub method: ClusteringMethod,
    /// Maximum number of tasks per job. Values `<= 0` disable size-based grouping.
    pub clusters_size: i64,
    /// Number of jobs per level, used by horizontal and balanced methods when `clusters_size <= 0`.
    pub clusters_num: i64,
    /// Per-depth overrides of `clusters_size`.
    pub level_sizes: BTreeMap<usize, i64>,
}

impl ClusteringParameters {
    pub fn new(method: ClusteringMethod, clusters_size: i64) -> Self {
        Self {
            method,
            clusters_size,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.level_sizes.is_empty()
            && !matches!(self.method, ClusteringMethod::Horizontal | ClusteringMethod::Balanced)
        {
            return Err(Error::InvalidParameter(format!(
                "per-level cluster sizes are not supported by {:?} clustering",
                self.method
            )));
        }
        Ok(())
    }

    /// Cluster size for tasks at the given depth.
    pub fn size_at(&self, depth: usize) -> i64 {
        self.level_sizes.get(&depth).copied().unwrap_or(self.clusters_size)
    }
}

/// Grouping rule of a clustering method.
///
/// Returns groups of task ids; every task must belong to exactly one group.
pub trait ClusteringAlgorithm {
    fn group(&self, workflow: &Workflow) -> Vec<Vec<usize>>;
}

/// One job per task.
pub struct NoClustering;

impl ClusteringAlgorithm for NoClustering {
    fn group(&self, workflow: &Workflow) -> Vec<Vec<usize>> {
        workflow.tasks().iter().map(|t| vec![t.id]).collect()
    }
}

pub fn clustering_resolver(params: &ClusteringParameters) -> Box<dyn ClusteringAlgorithm> {
    match params.method {
        ClusteringMethod::None => Box::new(NoClustering),
        ClusteringMethod::Horizontal => Box::new(HorizontalClustering::new(params.clone())),
        ClusteringMethod::Vertical => Box::new(VerticalClustering::new(params.clusters_size)),
        ClusteringMethod::Balanced => Box::new(BalancedClustering::new(params.clone())),
    }
}

/// Turns a workflow into jobs according to the configured method.
pub struct ClusteringEngine {
    params: ClusteringParameters,
    algorithm: Box<dyn ClusteringAlgorithm>,
}

impl ClusteringEngine {
    pub fn new(params: ClusteringParameters) -> Result<Self> {
        params.validate()?;
        let algorithm = clustering_resolver(&params);
        Ok(Self { params, algorithm })
    }

    pub fn params(&self) -> &ClusteringParameters {
        &self.params
    }

    /// Builds jobs in `Clustered` state. Jobs are numbered by (depth, smallest task id).
    pub fn run(&self, workflow: &Workflow) -> Result<Vec<Job>> {
        if !workflow.is_finalized() {
            return Err(Error::InvalidWorkflow("workflow is not finalized".to_string()));
        }
        build_jobs(workflow, self.algorithm.group(workflow))
    }
}

pub(crate) fn build_jobs(workflow: &Workflow, groups: Vec<Vec<usize>>) -> Result<Vec<Job>> {
    let mut task_job = vec![usize::MAX; workflow.len()];
    let groups = groups
        .into_iter()
        .filter(|g| !g.is_empty())
        .map(|g| g.into_iter().sorted().collect::<Vec<_>>())
        .sorted_by_key(|g| (g.iter().map(|&t| workflow.task(t).depth).max().unwrap_or(0), g[0]))
        .collect::<Vec<_>>();
    for (job_id, group) in groups.iter().enumerate() {
        for &task_id in group.iter() {
            if task_id >= workflow.len() || task_job[task_id] != usize::MAX {
                return Err(Error::InvalidWorkflow(format!("task {} is clustered twice or unknown", task_id)));
            }
            task_job[task_id] = job_id;
        }
    }
    if let Some(task_id) = task_job.iter().position(|&j| j == usize::MAX) {
        return Err(Error::InvalidWorkflow(format!("task {} is not clustered", task_id)));
    }

    let mut jobs = Vec::with_capacity(groups.len());
    for (job_id, group) in groups.into_iter().enumerate() {
        let tasks = group.iter().map(|&t| workflow.task(t)).collect::<Vec<_>>();
        let depth = tasks.iter().map(|t| t.depth).max().unwrap_or(0);
        let length = tasks.iter().map(|t| t.length).sum();
        let mut job = Job::new(job_id, group, depth, length);
        let produced: BTreeSet<&str> = tasks
            .iter()
            .flat_map(|t| t.output_files.iter().map(|f| f.name.as_str()))
            .collect();
        job.input_files = tasks
            .iter()
            .flat_map(|t| t.input_files.iter())
            .filter(|f| !produced.contains(f.name.as_str()))
            .unique_by(|f| f.name.clone())
            .cloned()
            .collect();
        job.output_files = tasks
            .iter()
            .flat_map(|t| t.output_files.iter())
            .unique_by(|f| f.name.clone())
            .cloned()
            .collect();
        job.parents = tasks
            .iter()
            .flat_map(|t| t.parents.iter().map(|&p| task_job[p]))
            .filter(|&p| p != job_id)
            .collect();
        job.status = JobStatus::Clustered;
        jobs.push(job);
    }
    for job_id in 0..jobs.len() {
        let parents = jobs[job_id].parents.clone();
        for parent in parents {
            jobs[parent].children.insert(job_id);
        }
    }

    let parents = jobs.iter().map(|j| j.parents.clone()).collect::<Vec<_>>();
    if let Err(stuck) = topological_sort(&parents) {
        return Err(Error::InvalidWorkflow(format!("clustering produced a cycle through jobs {:?}", stuck)));
    }
    Ok(jobs)
}
