use std::cmp::Ordering;

use crate::scheduler::{estimate_completion, Assignment, ReadyJob, Scheduler, VmSnapshot};

/// Greedy minimum-completion-time heuristic.
///
/// Repeatedly takes the (job, VM) pair with the globally smallest estimated completion time, assigns it and
/// moves the VM availability to that time. Ties are broken by lower job id, then lower VM id.
#[derive(Default)]
pub struct MinMinScheduler {}

impl MinMinScheduler {
    pub fn new() -> Self {
        Self {}
    }
}

impl Scheduler for MinMinScheduler {
    fn name(&self) -> &str {
        "MinMin"
    }

    fn select(&mut self, ready: &[ReadyJob], vms: &[VmSnapshot], now: f64) -> Vec<Assignment> {
        let mut vms = vms.to_vec();
        let mut pending: Vec<&ReadyJob> = ready.iter().collect();
        let mut result = Vec::new();
        loop {
            let mut best: Option<(usize, usize, f64)> = None;
            for (job_idx, job) in pending.iter().enumerate() {
                for (vm_idx, vm) in vms.iter().enumerate() {
                    let Some(finish) = estimate_completion(job, vm, now) else {
                        continue;
                    };
                    let better = match best {
                        None => true,
                        Some((bj, bv, bf)) => match finish.total_cmp(&bf) {
                            Ordering::Less => true,
                            Ordering::Greater => false,
                            Ordering::Equal => (job.id, vm.id) < (pending[bj].id, vms[bv].id),
                        },
                    };
                    if better {
                        best = Some((job_idx, vm_idx, finish));
                    }
                }
            }
            let Some((job_idx, vm_idx, finish)) = best else {
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
