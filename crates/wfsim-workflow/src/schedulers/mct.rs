use crate::scheduler::{best_vm, Assignment, ReadyJob, Scheduler, VmSnapshot};

/// Takes jobs in id order and puts each on the VM where it completes earliest.
#[derive(Default)]
pub struct MctScheduler {}

impl MctScheduler {
    pub fn new() -> Self {
        Self {}
    }
}

impl Scheduler for MctScheduler {
    fn name(&self) -> &str {
        "Mct"
    }

    fn select(&mut self, ready: &[ReadyJob], vms: &[VmSnapshot], now: f64) -> Vec<Assignment> {
        let mut vms = vms.to_vec();
        let mut result = Vec::new();
        for job in ready.iter() {
            if let Some((vm_idx, finish)) = best_vm(job, &vms, now) {
                vms[vm_idx].available_at = finish;
                result.push(Assignment {
                    job: job.id,
                    vm: vms[vm_idx].id,
                    estimated_finish: finish,
                });
            }
        }
        result
    }
}
