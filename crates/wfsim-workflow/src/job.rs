//! Schedulable jobs produced by clustering.

use std::collections::BTreeSet;

use serde::Serialize;

use wfsim_cloud::FileItem;

use crate::error::Error;

/// Lifecycle of a job.
///
/// `Created → Clustered → Ready → Queued → Executing → {Success, Failed}`. A job may also fail directly from
/// `Clustered`, `Ready` or `Queued` when a parent fails or no VM can serve it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Clustered,
    Ready,
    Queued,
    Executing,
    Success,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobFailReason {
    /// No VM could run the job, or its VM went away.
    ResourceUnavailable { reason: String },
    /// Job can never run because a dependency failed.
    ParentFailed { parent: usize },
}

/// Group of tasks scheduled and executed as a whole.
#[derive(Clone, Debug, Serialize)]
pub struct Job {
    pub id: usize,
    pub task_ids: Vec<usize>,
    /// Maximum depth of the constituent tasks.
    pub depth: usize,
    /// Sum of constituent task lengths in MI.
    pub length: f64,
    pub pes: u32,
    /// Files read from outside of the job.
    pub input_files: Vec<FileItem>,
    pub output_files: Vec<FileItem>,
    pub parents: BTreeSet<usize>,
    pub children: BTreeSet<usize>,
    pub status: JobStatus,
    pub vm_id: Option<u32>,
    pub host_id: Option<u32>,
    pub ready_time: Option<f64>,
    pub submission_time: Option<f64>,
    pub exec_start_time: Option<f64>,
    pub finish_time: Option<f64>,
    /// Completion time predicted by the scheduler at assignment.
    pub estimated_finish_time: Option<f64>,
    pub clustering_delay: f64,
    pub engine_delay: f64,
    pub queue_delay: f64,
    pub post_delay: f64,
    pub file_transfer_time: f64,
    pub cpu_time: f64,
    pub cost: f64,
    pub fail_reason: Option<JobFailReason>,
}

impl Job {
    pub fn new(id: usize, task_ids: Vec<usize>, depth: usize, length: f64) -> Self {
        Self {
            id,
            task_ids,
            depth,
            length,
            pes: 1,
            input_files: Vec::new(),
            output_files: Vec::new(),
            parents: BTreeSet::new(),
            children: BTreeSet::new(),
            status: JobStatus::Created,
            vm_id: None,
            host_id: None,
            ready_time: None,
            submission_time: None,
            exec_start_time: None,
            finish_time: None,
            estimated_finish_time: None,
            clustering_delay: 0.,
            engine_delay: 0.,
            queue_delay: 0.,
            post_delay: 0.,
            file_transfer_time: 0.,
            cpu_time: 0.,
            cost: 0.,
            fail_reason: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Error describing why the job could not run on a VM, if it failed for that reason.
    pub fn error(&self) -> Option<Error> {
        match &self.fail_reason {
            Some(JobFailReason::ResourceUnavailable { reason }) => Some(Error::ResourceUnavailable {
                job: self.id,
                vm: self.vm_id,
                reason: reason.clone(),
            }),
            _ => None,
        }
    }

    pub(crate) fn fail(&mut self, reason: JobFailReason, time: f64) {
        self.status = JobStatus::Failed;
        self.fail_reason = Some(reason);
        self.cost = 0.;
        self.finish_time = Some(time);
    }
}
