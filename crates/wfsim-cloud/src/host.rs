//! Physical hosts and their processing elements.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::allocation::AllocationVerdict;
use crate::vm::VmSpec;

/// Processing element (CPU core) of a host.
#[derive(Clone, Debug, Serialize)]
pub struct Pe {
    pub id: u32,
    /// Capacity in MIPS.
    pub mips: f64,
    /// MIPS not yet granted to VMs.
    pub available_mips: f64,
}

impl Pe {
    pub fn new(id: u32, mips: f64) -> Self {
        Self {
            id,
            mips,
            available_mips: mips,
        }
    }

    fn is_free(&self) -> bool {
        self.available_mips >= self.mips
    }
}

/// Policy for sharing host PEs between resident VMs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmScheduler {
    /// Each VM PE gets a whole host PE.
    SpaceShared,
    /// VM PEs get MIPS shares of host PEs, several VMs may share one PE.
    TimeShared,
}

impl Default for VmScheduler {
    fn default() -> Self {
        VmScheduler::TimeShared
    }
}

/// Resources granted to a VM on a host.
#[derive(Clone, Debug, Serialize)]
pub struct HostAllocation {
    /// `(pe index, mips)` for every VM PE.
    pub pe_shares: Vec<(usize, f64)>,
    pub ram: u64,
    pub bw: u64,
    pub size: u64,
}

/// Physical machine that hosts VMs.
#[derive(Clone, Debug, Serialize)]
pub struct Host {
    pub id: u32,
    pub pes: Vec<Pe>,
    pub ram: u64,
    pub bw: u64,
    pub storage: u64,
    pub vm_scheduler: VmScheduler,
    ram_available: u64,
    bw_available: u64,
    storage_available: u64,
    allocations: BTreeMap<u32, HostAllocation>,
}

impl Host {
    pub fn new(id: u32, pe_count: u32, pe_mips: f64, ram: u64, bw: u64, storage: u64, vm_scheduler: VmScheduler) -> Self {
        Self {
            id,
            pes: (0..pe_count).map(|i| Pe::new(i, pe_mips)).collect(),
            ram,
            bw,
            storage,
            vm_scheduler,
            ram_available: ram,
            bw_available: bw,
            storage_available: storage,
            allocations: BTreeMap::new(),
        }
    }

    pub fn ram_available(&self) -> u64 {
        self.ram_available
    }

    pub fn bw_available(&self) -> u64 {
        self.bw_available
    }

    pub fn storage_available(&self) -> u64 {
        self.storage_available
    }

    pub fn total_mips(&self) -> f64 {
        self.pes.iter().map(|pe| pe.mips).sum()
    }

    pub fn available_mips(&self) -> f64 {
        self.pes.iter().map(|pe| pe.available_mips).sum()
    }

    /// Number of PEs with no MIPS granted to any VM.
    pub fn free_pes(&self) -> usize {
        self.pes.iter().filter(|pe| pe.is_free()).count()
    }

    pub fn vm_ids(&self) -> impl Iterator<Item = &u32> {
        self.allocations.keys()
    }

    pub fn allocation(&self, vm_id: u32) -> Option<&HostAllocation> {
        self.allocations.get(&vm_id)
    }

    fn select_pes(&self, vm: &VmSpec) -> Option<Vec<(usize, f64)>> {
        if vm.pes as usize > self.pes.len() {
            return None;
        }
        let mut candidates: Vec<usize> = match self.vm_scheduler {
            VmScheduler::SpaceShared => (0..self.pes.len())
                .filter(|&i| self.pes[i].is_free() && self.pes[i].mips >= vm.mips)
                .collect(),
            VmScheduler::TimeShared => (0..self.pes.len())
                .filter(|&i| self.pes[i].available_mips >= vm.mips)
                .collect(),
        };
        if candidates.len() < vm.pes as usize {
            return None;
        }
        // least used PEs first, so time-shared VMs spread over the host
        candidates.sort_by(|&a, &b| {
            self.pes[b]
                .available_mips
                .total_cmp(&self.pes[a].available_mips)
                .then(a.cmp(&b))
        });
        let grant = |i: usize| match self.vm_scheduler {
            VmScheduler::SpaceShared => self.pes[i].mips,
            VmScheduler::TimeShared => vm.mips,
        };
        Some(candidates.into_iter().take(vm.pes as usize).map(|i| (i, grant(i))).collect())
    }

    /// Checks if the VM can be placed on this host now.
    pub fn can_allocate(&self, vm: &VmSpec) -> AllocationVerdict {
        if self.ram_available < vm.ram {
            return AllocationVerdict::NotEnoughMemory;
        }
        if self.bw_available < vm.bw {
            return AllocationVerdict::NotEnoughBandwidth;
        }
        if self.storage_available < vm.size {
            return AllocationVerdict::NotEnoughStorage;
        }
        if self.select_pes(vm).is_none() {
            return AllocationVerdict::NotEnoughPes;
        }
        AllocationVerdict::Success
    }

    /// Places the VM on this host, reserving its PE shares, memory, bandwidth and disk.
    pub fn allocate(&mut self, vm_id: u32, vm: &VmSpec) -> AllocationVerdict {
        let verdict = self.can_allocate(vm);
        if verdict != AllocationVerdict::Success {
            return verdict;
        }
        let pe_shares = match self.select_pes(vm) {
            Some(shares) => shares,
            None => return AllocationVerdict::NotEnoughPes,
        };
        for &(i, mips) in pe_shares.iter() {
            self.pes[i].available_mips -= mips;
        }
        self.ram_available -= vm.ram;
        self.bw_available -= vm.bw;
        self.storage_available -= vm.size;
        self.allocations.insert(
            vm_id,
            HostAllocation {
                pe_shares,
                ram: vm.ram,
                bw: vm.bw,
                size: vm.size,
            },
        );
        AllocationVerdict::Success
    }

    /// Releases resources of the VM. Returns `false` if the VM was not placed here.
    pub fn deallocate(&mut self, vm_id: u32) -> bool {
        let Some(alloc) = self.allocations.remove(&vm_id) else {
            return false;
        };
        for (i, mips) in alloc.pe_shares {
            self.pes[i].available_mips = (self.pes[i].available_mips + mips).min(self.pes[i].mips);
        }
        self.ram_available += alloc.ram;
        self.bw_available += alloc.bw;
        self.storage_available += alloc.size;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::CloudletScheduler;

    fn vm(mips: f64, pes: u32) -> VmSpec {
        VmSpec {
            user_id: 0,
            mips,
            pes,
            ram: 512,
            bw: 1000,
            size: 10000,
            vmm: "Xen".to_string(),
            cloudlet_scheduler: CloudletScheduler::SpaceShared,
        }
    }

    fn check_capacity(host: &Host) {
        for pe in host.pes.iter() {
            assert!(pe.available_mips >= -1e-9 && pe.available_mips <= pe.mips + 1e-9);
        }
        let granted: f64 = host
            .vm_ids()
            .filter_map(|id| host.allocation(*id))
            .flat_map(|a| a.pe_shares.iter().map(|s| s.1))
            .sum();
        assert!(granted <= host.total_mips() + 1e-9);
    }

    #[test]
    fn time_shared_host_packs_vms_on_pes() {
        let mut host = Host::new(0, 2, 2000., 2048, 10000, 1000000, VmScheduler::TimeShared);
        for id in 0..4 {
            assert_eq!(host.allocate(id, &vm(1000., 1)), AllocationVerdict::Success);
            check_capacity(&host);
        }
        assert_eq!(host.allocate(4, &vm(1000., 1)), AllocationVerdict::NotEnoughMemory);
        assert_eq!(host.available_mips(), 0.);
        assert!(host.deallocate(2));
        assert!(!host.deallocate(2));
        assert_eq!(host.available_mips(), 1000.);
        check_capacity(&host);
    }

    #[test]
    fn space_shared_host_grants_whole_pes() {
        let mut host = Host::new(0, 2, 2000., 8192, 10000, 1000000, VmScheduler::SpaceShared);
        assert_eq!(host.allocate(0, &vm(1000., 1)), AllocationVerdict::Success);
        assert_eq!(host.free_pes(), 1);
        assert_eq!(host.allocate(1, &vm(1000., 2)), AllocationVerdict::NotEnoughPes);
        assert_eq!(host.allocate(1, &vm(1000., 1)), AllocationVerdict::Success);
        assert_eq!(host.allocate(2, &vm(500., 1)), AllocationVerdict::NotEnoughPes);
        check_capacity(&host);
    }

    #[test]
    fn vm_with_too_fast_pes_does_not_fit() {
        let host = Host::new(0, 4, 1000., 8192, 10000, 1000000, VmScheduler::TimeShared);
        assert_eq!(host.can_allocate(&vm(1500., 1)), AllocationVerdict::NotEnoughPes);
        assert_eq!(host.can_allocate(&vm(1000., 5)), AllocationVerdict::NotEnoughPes);
        assert_eq!(host.can_allocate(&vm(0., 0)), AllocationVerdict::Success);
    }
}
