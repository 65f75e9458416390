use crate::scheduler::{estimate_completion, Assignment, ReadyJob, Scheduler, VmSnapshot};

/// Takes jobs in id order and puts each on the VM that becomes available first.
#[derive(Default)]
pub struct FcfsScheduler {}

impl FcfsScheduler {
    pub fn new() -> Self {
        Self {}
    }
}

impl Scheduler for FcfsScheduler {
    fn name(&self) -> &str {
        "Fcfs"
    }

    fn select(&mut self, ready: &[ReadyJob], vms: &[VmSnapshot], now: f64) -> Vec<Assignment> {
        let mut vms = vms.to_vec();
        let mut result = Vec::new();
        for job in ready.iter() {
            let target = vms
                .iter()
                .enumerate()
                .filter(|(_, vm)| vm.can_serve(job))
                .min_by(|(_, a), (_, b)| a.available_at.total_cmp(&b.available_at).then(a.id.cmp(&b.id)))
                .map(|(idx, _)| idx);
            if let Some(vm_idx) = target {
                if let Some(finish) = estimate_completion(job, &vms[vm_idx], now) {
                    vms[vm_idx].available_at = finish;
                    result.push(Assignment {
                        job: job.id,
                        vm: vms[vm_idx].id,
                        estimated_finish: finish,
                    });
                }
            }
        }
        result
    }
}
