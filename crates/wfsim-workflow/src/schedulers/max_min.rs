use crate::scheduler::{best_vm, Assignment, ReadyJob, Scheduler, VmSnapshot};

/// Assigns first the job whose best completion time is the largest, so long jobs are not postponed.
#[derive(Default)]
pub struct MaxMinScheduler {}

impl MaxMinScheduler {
    pub fn new() -> Self {
        Self {}
    }
}

impl Scheduler for MaxMinScheduler {
    fn name(&self) -> &str {
        "MaxMin"
    }

    fn select(&mut self, ready: &[ReadyJob], vms: &[VmSnapshot], now: f64) -> Vec<Assignment> {
        let mut vms = vms.to_vec();
        let mut pending: Vec<&ReadyJob> = ready.iter().collect();
        let mut result = Vec::new();
        loop {
            let mut chosen: Option<(usize, usize, f64)> = None;
            for (job_idx, job) in pending.iter().enumerate() {
                if let Some((vm_idx, finish)) = best_vm(job, &vms, now) {
                    if chosen.map_or(true, |(_, _, f)| finish > f) {
                        chosen = Some((job_idx, vm_idx, finish));
                    }
                }
            }
            let Some((job_idx, vm_idx, finish)) = chosen else {
                break;
            };
            result.push(Assignment {
                job: pending[job_idx].id,
                vm: vms[vm_idx].id,
                estimated_finish: finish,
            });
            vms[vm_idx].available_at = finish;
            pending.remove(job_idx);
        }
        result
    }
}
