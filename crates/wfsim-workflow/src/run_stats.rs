use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::job::{Job, JobStatus};

/// Aggregated metrics of a simulation run.
#[derive(Serialize, Deserialize, Clone, Default, Debug, PartialEq)]
pub struct RunStats {
    /// Time from the first job start to the last job finish, successful jobs only.
    pub makespan: f64,
    pub total_queue_delay: f64,
    pub total_clustering_delay: f64,
    pub total_post_delay: f64,
    pub total_engine_delay: f64,
    /// Sum of job CPU times, stage-in excluded.
    pub total_execution_time: f64,
    pub total_file_transfer_time: f64,
    pub total_cost: f64,
    pub successful_jobs: usize,
    pub failed_jobs: usize,
    /// Number of VMs which completed at least one job.
    pub used_vms: usize,
}

impl RunStats {
    pub fn from_jobs<'a, I: IntoIterator<Item = &'a Job>>(jobs: I) -> Self {
        let mut stats = Self::default();
        let mut first_start = f64::INFINITY;
        let mut last_finish = f64::NEG_INFINITY;
        let mut used_vms = BTreeSet::new();
        for job in jobs {
            stats.total_queue_delay += job.queue_delay;
            stats.total_clustering_delay += job.clustering_delay;
            stats.total_post_delay += job.post_delay;
            stats.total_engine_delay += job.engine_delay;
            stats.total_cost += job.cost;
            match job.status {
                JobStatus::Success => {
                    stats.successful_jobs += 1;
                    stats.total_execution_time += job.cpu_time;
                    stats.total_file_transfer_time += job.file_transfer_time;
                    if let Some(start) = job.exec_start_time {
                        first_start = first_start.min(start);
                    }
                    if let Some(finish) = job.finish_time {
                        last_finish = last_finish.max(finish);
                    }
                    if let Some(vm) = job.vm_id {
                        used_vms.insert(vm);
                    }
                }
                JobStatus::Failed => stats.failed_jobs += 1,
                _ => {}
            }
        }
        if last_finish >= first_start {
            stats.makespan = last_finish - first_start;
        }
        stats.used_vms = used_vms.len();
        stats
    }
}
