use crate::scheduler::{estimate_completion, Assignment, ReadyJob, Scheduler, VmSnapshot};

/// Deals jobs to VMs in cyclic order, skipping VMs that can not serve the job.
#[derive(Default)]
pub struct RoundRobinScheduler {
    next: usize,
}

impl RoundRobinScheduler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for RoundRobinScheduler {
    fn name(&self) -> &str {
        "RoundRobin"
    }

    fn select(&mut self, ready: &[ReadyJob], vms: &[VmSnapshot], now: f64) -> Vec<Assignment> {
        let mut vms = vms.to_vec();
        let mut result = Vec::new();
        if vms.is_empty() {
            return result;
        }
        for job in ready.iter() {
            for offset in 0..vms.len() {
                let vm_idx = (self.next + offset) % vms.len();
                if let Some(finish) = estimate_completion(job, &vms[vm_idx], now) {
                    vms[vm_idx].available_at = finish;
                    result.push(Assignment {
                        job: job.id,
                        vm: vms[vm_idx].id,
                        estimated_finish: finish,
                    });
                    self.next = vm_idx + 1;
                    break;
                }
            }
        }
        result
    }
}
