//! VM allocation policies.

use serde::{Deserialize, Serialize};

use crate::host::Host;
use crate::vm::VmSpec;

/// Result of checking whether a VM can be placed on a host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum AllocationVerdict {
    Success,
    NotEnoughPes,
    NotEnoughMemory,
    NotEnoughBandwidth,
    NotEnoughStorage,
    HostNotFound,
}

/// Trait for implementation of VM allocation policies.
///
/// The policy is a function of the VM request and current host states, which returns the index of the host
/// selected for VM placement or `None` if there is no suitable host.
pub trait VmAllocationPolicy {
    fn select_host(&self, vm: &VmSpec, hosts: &[Host]) -> Option<usize>;
}

/// Policy selector used in configuration files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmAllocationPolicyKind {
    FirstFit,
    BestFit,
    LeastLoaded,
}

impl Default for VmAllocationPolicyKind {
    fn default() -> Self {
        VmAllocationPolicyKind::LeastLoaded
    }
}

pub fn allocation_policy_resolver(kind: VmAllocationPolicyKind) -> Box<dyn VmAllocationPolicy> {
    match kind {
        VmAllocationPolicyKind::FirstFit => Box::new(FirstFit),
        VmAllocationPolicyKind::BestFit => Box::new(BestFit),
        VmAllocationPolicyKind::LeastLoaded => Box::new(LeastLoaded),
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Returns the first suitable host.
pub struct FirstFit;

impl VmAllocationPolicy for FirstFit {
    fn select_host(&self, vm: &VmSpec, hosts: &[Host]) -> Option<usize> {
        hosts
            .iter()
            .position(|host| host.can_allocate(vm) == AllocationVerdict::Success)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Returns the suitable host with the least available MIPS.
pub struct BestFit;

impl VmAllocationPolicy for BestFit {
    fn select_host(&self, vm: &VmSpec, hosts: &[Host]) -> Option<usize> {
        let mut result: Option<usize> = None;
        let mut min_available = f64::INFINITY;
        for (i, host) in hosts.iter().enumerate() {
            if host.can_allocate(vm) == AllocationVerdict::Success && host.available_mips() < min_available {
                min_available = host.available_mips();
                result = Some(i);
            }
        }
        result
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Returns the suitable host with the most free PEs, ties broken by available MIPS.
///
/// This spreads VMs over the datacenter, one per host while free hosts remain.
pub struct LeastLoaded;

impl VmAllocationPolicy for LeastLoaded {
    fn select_host(&self, vm: &VmSpec, hosts: &[Host]) -> Option<usize> {
        let mut result: Option<usize> = None;
        let mut best = (0usize, f64::NEG_INFINITY);
        for (i, host) in hosts.iter().enumerate() {
            if host.can_allocate(vm) != AllocationVerdict::Success {
                continue;
            }
            let key = (host.free_pes(), host.available_mips());
            if result.is_none() || key.0 > best.0 || (key.0 == best.0 && key.1 > best.1) {
                best = key;
                result = Some(i);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::VmScheduler;
    use crate::vm::CloudletScheduler;

    fn hosts() -> Vec<Host> {
        (0..3)
            .map(|id| Host::new(id, 2, 2000., 4096, 10000, 1000000, VmScheduler::TimeShared))
            .collect()
    }

    fn vm() -> VmSpec {
        VmSpec {
            user_id: 0,
            mips: 1000.,
            pes: 1,
            ram: 512,
            bw: 1000,
            size: 10000,
            vmm: "Xen".to_string(),
            cloudlet_scheduler: CloudletScheduler::SpaceShared,
        }
    }

    #[test]
    fn first_fit_fills_first_host() {
        let mut hosts = hosts();
        for id in 0..3 {
            let i = FirstFit.select_host(&vm(), &hosts).unwrap();
            assert_eq!(i, 0);
            assert_eq!(hosts[i].allocate(id, &vm()), AllocationVerdict::Success);
        }
    }

    #[test]
    fn least_loaded_spreads_vms() {
        let mut hosts = hosts();
        let mut selected = Vec::new();
        for id in 0..3 {
            let i = LeastLoaded.select_host(&vm(), &hosts).unwrap();
            hosts[i].allocate(id, &vm());
            selected.push(i);
        }
        assert_eq!(selected, vec![0, 1, 2]);
    }

    #[test]
    fn best_fit_prefers_loaded_host() {
        let mut hosts = hosts();
        hosts[1].allocate(0, &vm());
        assert_eq!(BestFit.select_host(&vm(), &hosts), Some(1));
    }

    #[test]
    fn no_host_for_oversized_vm() {
        let mut big = vm();
        big.ram = 1 << 20;
        for kind in [
            VmAllocationPolicyKind::FirstFit,
            VmAllocationPolicyKind::BestFit,
            VmAllocationPolicyKind::LeastLoaded,
        ] {
            assert_eq!(allocation_policy_resolver(kind).select_host(&big, &hosts()), None);
        }
    }
}
