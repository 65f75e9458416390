//! Datacenter component executing cloudlets on VMs.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use wfsim_core::{cast, log_debug, log_trace, log_warn, Event, EventHandler, EventId, Id, SimulationContext};

use crate::allocation::{AllocationVerdict, VmAllocationPolicy};
use crate::cloudlet::Cloudlet;
use crate::events::*;
use crate::file::FileItem;
use crate::host::Host;
use crate::replica_catalog::{FileSystem, Location, ReplicaCatalog};
use crate::storage::Storage;
use crate::throughput::FairSharingModel;
use crate::vm::{CloudletScheduler, Vm, VmSpec, VmStatus};

/// Static description and prices of a datacenter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DatacenterCharacteristics {
    #[serde(default = "default_arch")]
    pub arch: String,
    #[serde(default = "default_os")]
    pub os: String,
    #[serde(default = "default_vmm")]
    pub vmm: String,
    #[serde(default)]
    pub time_zone: f64,
    /// Price of one second of CPU time.
    pub cost_per_sec: f64,
    /// Price of one MB of memory.
    pub cost_per_mem: f64,
    /// Price of one MB of storage.
    pub cost_per_storage: f64,
    /// Price of one MB transferred.
    pub cost_per_bw: f64,
}

fn default_arch() -> String {
    "x86".to_string()
}

fn default_os() -> String {
    "Linux".to_string()
}

fn default_vmm() -> String {
    "Xen".to_string()
}

impl Default for DatacenterCharacteristics {
    fn default() -> Self {
        Self {
            arch: default_arch(),
            os: default_os(),
            vmm: default_vmm(),
            time_zone: 10.,
            cost_per_sec: 3.0,
            cost_per_mem: 0.05,
            cost_per_storage: 0.1,
            cost_per_bw: 0.1,
        }
    }
}

struct RunningCloudlet {
    cloudlet: Cloudlet,
    requester: Id,
    exec_start_time: f64,
    compute_start_time: f64,
    file_transfer_time: f64,
    transferred: f64,
    pending_event: Option<EventId>,
}

struct VmState {
    vm: Vm,
    free_pes: u32,
    waiting: VecDeque<(Cloudlet, Id)>,
    running: BTreeMap<u64, RunningCloudlet>,
    shared_model: FairSharingModel<u64>,
    next_finish: Option<EventId>,
}

impl VmState {
    fn host_id(&self) -> u32 {
        self.vm.host.unwrap_or(u32::MAX)
    }
}

/// Owns hosts, storage and VMs, runs submitted cloudlets and reports their completion to the submitter.
pub struct Datacenter {
    characteristics: DatacenterCharacteristics,
    hosts: Vec<Host>,
    storage: Storage,
    catalog: ReplicaCatalog,
    allocation_policy: Box<dyn VmAllocationPolicy>,
    vms: Vec<VmState>,
    ctx: SimulationContext,
}

impl Datacenter {
    pub fn new(
        characteristics: DatacenterCharacteristics,
        hosts: Vec<Host>,
        storage: Storage,
        file_system: FileSystem,
        allocation_policy: Box<dyn VmAllocationPolicy>,
        ctx: SimulationContext,
    ) -> Self {
        Self {
            characteristics,
            hosts,
            storage,
            catalog: ReplicaCatalog::new(file_system),
            allocation_policy,
            vms: Vec::new(),
            ctx,
        }
    }

    pub fn id(&self) -> Id {
        self.ctx.id()
    }

    pub fn characteristics(&self) -> &DatacenterCharacteristics {
        &self.characteristics
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    pub fn replica_catalog(&self) -> &ReplicaCatalog {
        &self.catalog
    }

    pub fn replica_catalog_mut(&mut self) -> &mut ReplicaCatalog {
        &mut self.catalog
    }

    /// Creates a VM and places it on a host chosen by the allocation policy.
    ///
    /// The VM gets an id even if no host can take it. Such VM has [`VmStatus::FailedToAllocate`] status and
    /// every cloudlet submitted to it fails.
    pub fn create_vm(&mut self, spec: VmSpec) -> u32 {
        let id = self.vms.len() as u32;
        let (host, status) = match self.allocation_policy.select_host(&spec, &self.hosts) {
            Some(idx) => match self.hosts[idx].allocate(id, &spec) {
                AllocationVerdict::Success => (Some(self.hosts[idx].id), VmStatus::Created),
                verdict => (None, VmStatus::FailedToAllocate(verdict)),
            },
            None => {
                let verdict = self
                    .hosts
                    .iter()
                    .map(|h| h.can_allocate(&spec))
                    .find(|v| *v != AllocationVerdict::Success)
                    .unwrap_or(AllocationVerdict::HostNotFound);
                (None, VmStatus::FailedToAllocate(verdict))
            }
        };
        match status {
            VmStatus::Created => log_debug!(self.ctx, "vm {} created on host {}", id, host.unwrap_or_default()),
            _ => log_warn!(self.ctx, "vm {} can not be allocated: {:?}", id, status),
        }
        let shared_model = FairSharingModel::for_vm(spec.mips, spec.pes);
        self.vms.push(VmState {
            free_pes: spec.pes,
            vm: Vm { id, spec, host, status },
            waiting: VecDeque::new(),
            running: BTreeMap::new(),
            shared_model,
            next_finish: None,
        });
        id
    }

    pub fn vm(&self, vm_id: u32) -> Option<&Vm> {
        self.vms.get(vm_id as usize).map(|s| &s.vm)
    }

    pub fn vms(&self) -> impl Iterator<Item = &Vm> {
        self.vms.iter().map(|s| &s.vm)
    }

    /// Number of cloudlets currently holding PEs of the VM or staging their inputs.
    pub fn running_cloudlets(&self, vm_id: u32) -> usize {
        self.vms.get(vm_id as usize).map_or(0, |s| s.running.len())
    }

    /// Number of cloudlets waiting for free PEs of the VM.
    pub fn waiting_cloudlets(&self, vm_id: u32) -> usize {
        self.vms.get(vm_id as usize).map_or(0, |s| s.waiting.len())
    }

    /// Places a workflow input file on the datacenter storage.
    pub fn register_input_file(&mut self, file: &FileItem) {
        if !self.storage.reserve(file.size_mb()) {
            log_warn!(self.ctx, "storage {} is full, file {} is kept anyway", self.storage.name, file.name);
        }
        self.catalog
            .add_replica(&file.name, Location::Storage(self.storage.name.clone()));
    }

    fn fail(&mut self, cloudlet: &Cloudlet, requester: Id, reason: FailReason) {
        log_debug!(self.ctx, "cloudlet {} failed on vm {}: {:?}", cloudlet.id, cloudlet.vm_id, reason);
        self.ctx.emit_now(
            CloudletFailed {
                id: cloudlet.id,
                vm_id: cloudlet.vm_id,
                reason,
            },
            requester,
        );
    }

    fn on_submit(&mut self, cloudlet: Cloudlet, requester: Id) {
        let vm_idx = cloudlet.vm_id as usize;
        let scheduler = match self.vms.get(vm_idx) {
            None => Err(FailReason::VmUnavailable),
            Some(state) if !state.vm.is_running() => Err(FailReason::VmUnavailable),
            Some(state) if !state.vm.spec.has_capacity() || cloudlet.pes > state.vm.spec.pes => {
                Err(FailReason::NotEnoughResources)
            }
            Some(state) => Ok(state.vm.spec.cloudlet_scheduler),
        };
        match scheduler {
            Err(reason) => self.fail(&cloudlet, requester, reason),
            Ok(CloudletScheduler::SpaceShared) => {
                log_trace!(self.ctx, "cloudlet {} queued on vm {}", cloudlet.id, cloudlet.vm_id);
                self.vms[vm_idx].waiting.push_back((cloudlet, requester));
                self.start_waiting(vm_idx);
            }
            Ok(CloudletScheduler::TimeShared) => self.start(vm_idx, cloudlet, requester),
        }
    }

    fn start_waiting(&mut self, vm_idx: usize) {
        loop {
            let state = &mut self.vms[vm_idx];
            match state.waiting.front() {
                Some((cloudlet, _)) if cloudlet.pes <= state.free_pes => {}
                _ => break,
            }
            if let Some((cloudlet, requester)) = state.waiting.pop_front() {
                state.free_pes -= cloudlet.pes;
                self.start(vm_idx, cloudlet, requester);
            }
        }
    }

    /// Returns the stage-in duration and the amount of transferred data in MB.
    fn stage_in(&self, cloudlet: &Cloudlet) -> (f64, f64) {
        let transferred: f64 = cloudlet
            .input_files
            .iter()
            .filter(|f| self.catalog.needs_transfer(&f.name, cloudlet.vm_id))
            .map(|f| f.size_mb())
            .sum();
        (self.storage.transfer_time(transferred), transferred)
    }

    fn start(&mut self, vm_idx: usize, cloudlet: Cloudlet, requester: Id) {
        let (file_transfer_time, transferred) = self.stage_in(&cloudlet);
        let now = self.ctx.time();
        let state = &mut self.vms[vm_idx];
        let vm_id = state.vm.id;
        let host_id = state.host_id();
        let cloudlet_id = cloudlet.id;
        self.ctx.emit_now(
            CloudletStarted {
                id: cloudlet_id,
                vm_id,
                host_id,
            },
            requester,
        );
        let pending = self
            .ctx
            .emit_self(StageInFinished { vm_id, cloudlet_id }, file_transfer_time);
        state.running.insert(
            cloudlet_id,
            RunningCloudlet {
                cloudlet,
                requester,
                exec_start_time: now,
                compute_start_time: now,
                file_transfer_time,
                transferred,
                pending_event: Some(pending),
            },
        );
        log_debug!(
            self.ctx,
            "cloudlet {} started on vm {}, staging {:.3} MB",
            cloudlet_id,
            vm_id,
            transferred
        );
    }

    fn on_stage_in_finished(&mut self, vm_id: u32, cloudlet_id: u64) {
        let now = self.ctx.time();
        let local = self.catalog.file_system() == FileSystem::Local;
        let state = &mut self.vms[vm_id as usize];
        let Some(running) = state.running.get_mut(&cloudlet_id) else {
            return;
        };
        running.compute_start_time = now;
        running.pending_event = None;
        if local {
            for file in running.cloudlet.input_files.iter() {
                self.catalog.add_replica(&file.name, Location::Vm(vm_id));
            }
        }
        match state.vm.spec.cloudlet_scheduler {
            CloudletScheduler::SpaceShared => {
                let delay = running.cloudlet.length / state.vm.spec.rate(running.cloudlet.pes);
                running.pending_event = Some(self.ctx.emit_self(ExecutionFinished { vm_id, cloudlet_id }, delay));
            }
            CloudletScheduler::TimeShared => {
                let length = running.cloudlet.length;
                let pes = running.cloudlet.pes.max(1) as f64;
                if let Some(event_id) = state.next_finish.take() {
                    self.ctx.cancel_event(event_id);
                }
                state.shared_model.insert(now, length, pes, cloudlet_id);
                self.schedule_next_shared_finish(vm_id as usize);
            }
        }
    }

    fn schedule_next_shared_finish(&mut self, vm_idx: usize) {
        let state = &mut self.vms[vm_idx];
        if let Some((time, &cloudlet_id)) = state.shared_model.peek() {
            let vm_id = state.vm.id;
            let delay = (time - self.ctx.time()).max(0.);
            state.next_finish = Some(self.ctx.emit_self(ExecutionFinished { vm_id, cloudlet_id }, delay));
        }
    }

    fn on_execution_finished(&mut self, vm_id: u32, cloudlet_id: u64) {
        let vm_idx = vm_id as usize;
        match self.vms[vm_idx].vm.spec.cloudlet_scheduler {
            CloudletScheduler::SpaceShared => {
                if let Some(running) = self.vms[vm_idx].running.remove(&cloudlet_id) {
                    self.vms[vm_idx].free_pes += running.cloudlet.pes;
                    self.complete(vm_idx, running);
                }
                self.start_waiting(vm_idx);
            }
            CloudletScheduler::TimeShared => {
                let state = &mut self.vms[vm_idx];
                state.next_finish = None;
                if let Some((_, finished_id)) = state.shared_model.pop() {
                    assert_eq!(finished_id, cloudlet_id, "unexpected cloudlet finished on vm {}", vm_id);
                    if let Some(running) = state.running.remove(&finished_id) {
                        self.complete(vm_idx, running);
                    }
                }
                self.schedule_next_shared_finish(vm_idx);
            }
        }
    }

    fn complete(&mut self, vm_idx: usize, running: RunningCloudlet) {
        let now = self.ctx.time();
        let vm_id = self.vms[vm_idx].vm.id;
        let host_id = self.vms[vm_idx].host_id();
        let output_location = self.catalog.output_location(vm_id, &self.storage.name);
        for file in running.cloudlet.output_files.iter() {
            if let Location::Storage(_) = output_location {
                self.storage.reserve(file.size_mb());
            }
            self.catalog.add_replica(&file.name, output_location.clone());
        }
        let cpu_time = now - running.compute_start_time;
        let cost =
            self.characteristics.cost_per_sec * cpu_time + self.characteristics.cost_per_bw * running.transferred;
        log_debug!(
            self.ctx,
            "cloudlet {} finished on vm {} (cpu time {:.3}, cost {:.3})",
            running.cloudlet.id,
            vm_id,
            cpu_time,
            cost
        );
        self.ctx.emit_now(
            CloudletReturned {
                id: running.cloudlet.id,
                vm_id,
                host_id,
                exec_start_time: running.exec_start_time,
                finish_time: now,
                cpu_time,
                file_transfer_time: running.file_transfer_time,
                transferred: running.transferred,
                cost,
            },
            running.requester,
        );
    }

    fn destroy_vm(&mut self, vm_id: u32) {
        let vm_idx = vm_id as usize;
        if vm_idx >= self.vms.len() || !self.vms[vm_idx].vm.is_running() {
            return;
        }
        if let Some(event_id) = self.vms[vm_idx].next_finish.take() {
            self.ctx.cancel_event(event_id);
        }
        self.vms[vm_idx].shared_model.drain();
        let waiting: Vec<_> = self.vms[vm_idx].waiting.drain(..).collect();
        let running = std::mem::take(&mut self.vms[vm_idx].running);
        for (_, cloudlet) in running {
            if let Some(event_id) = cloudlet.pending_event {
                self.ctx.cancel_event(event_id);
            }
            self.fail(&cloudlet.cloudlet, cloudlet.requester, FailReason::VmUnavailable);
        }
        for (cloudlet, requester) in waiting {
            self.fail(&cloudlet, requester, FailReason::VmUnavailable);
        }
        let state = &mut self.vms[vm_idx];
        if let Some(host_id) = state.vm.host.take() {
            if let Some(host) = self.hosts.iter_mut().find(|h| h.id == host_id) {
                host.deallocate(vm_id);
            }
        }
        state.vm.status = VmStatus::Destroyed;
        state.free_pes = 0;
        self.catalog.remove_vm(vm_id);
        log_debug!(self.ctx, "vm {} destroyed", vm_id);
    }
}

impl EventHandler for Datacenter {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            CloudletSubmit { cloudlet } => {
                self.on_submit(cloudlet, event.src);
            }
            StageInFinished { vm_id, cloudlet_id } => {
                self.on_stage_in_finished(vm_id, cloudlet_id);
            }
            ExecutionFinished { vm_id, cloudlet_id } => {
                self.on_execution_finished(vm_id, cloudlet_id);
            }
            VmDestroyRequest { vm_id } => {
                self.destroy_vm(vm_id);
                self.ctx.emit_now(VmDestroyed { vm_id }, event.src);
            }
        })
    }
}
