//! Workflow engine: releases jobs as their dependencies complete, runs the scheduler at every tick and
//! tracks job execution on the datacenter.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde::Serialize;

use wfsim_cloud::events::{
    CloudletFailed, CloudletReturned, CloudletStarted, CloudletSubmit, VmDestroyRequest, VmDestroyed,
};
use wfsim_cloud::Cloudlet;
use wfsim_core::{cast, log_debug, log_error, log_info, log_trace, log_warn, Event, EventHandler, Id, SimulationContext};

use crate::job::{Job, JobFailReason, JobStatus};
use crate::overhead::OverheadInjector;
use crate::scheduler::{Assignment, ReadyJob, Scheduler, VmSnapshot};
use crate::trace_log::{TraceEvent, TraceLog, VmRecord};

#[derive(Clone, Serialize)]
pub struct JobReleased {
    pub job: usize,
}

#[derive(Clone, Serialize)]
pub struct SchedulingTick {}

#[derive(Clone, Serialize)]
pub struct JobPostProcessed {
    pub job: usize,
}

/// VM as tracked by the engine.
#[derive(Clone, Debug, Serialize)]
pub struct VmInfo {
    pub id: u32,
    pub mips: f64,
    pub pes: u32,
    /// Estimated time when all jobs assigned to the VM are done.
    pub available_at: f64,
    /// Jobs assigned to the VM and not yet returned.
    pub outstanding: usize,
    pub alive: bool,
}

impl VmInfo {
    pub fn new(id: u32, mips: f64, pes: u32) -> Self {
        Self {
            id,
            mips,
            pes,
            available_at: 0.,
            outstanding: 0,
            alive: true,
        }
    }

    fn release(&mut self, now: f64) {
        self.outstanding = self.outstanding.saturating_sub(1);
        if self.outstanding == 0 {
            self.available_at = now;
        }
    }
}

pub struct WorkflowEngine {
    jobs: Vec<Job>,
    vms: BTreeMap<u32, VmInfo>,
    ready: BTreeSet<usize>,
    releasing: BTreeSet<usize>,
    received: Vec<usize>,
    scheduler: Box<dyn Scheduler>,
    overhead: OverheadInjector,
    datacenter: Id,
    tick_pending: bool,
    trace_log: TraceLog,
    ctx: SimulationContext,
}

impl WorkflowEngine {
    /// Creates an engine for jobs whose ids are equal to their positions in `jobs`.
    pub fn new(
        jobs: Vec<Job>,
        vms: Vec<VmInfo>,
        datacenter: Id,
        scheduler: Box<dyn Scheduler>,
        overhead: OverheadInjector,
        ctx: SimulationContext,
    ) -> Self {
        Self {
            jobs,
            vms: vms.into_iter().map(|vm| (vm.id, vm)).collect(),
            ready: BTreeSet::new(),
            releasing: BTreeSet::new(),
            received: Vec::new(),
            scheduler,
            overhead,
            datacenter,
            tick_pending: false,
            trace_log: TraceLog::new(),
            ctx,
        }
    }

    pub fn id(&self) -> Id {
        self.ctx.id()
    }

    pub fn start(&mut self) {
        log_info!(
            self.ctx,
            "started workflow execution: {} jobs, {} vms, scheduler {}",
            self.jobs.len(),
            self.vms.values().filter(|vm| vm.alive).count(),
            self.scheduler.name()
        );
        self.trace_log.vms = self
            .vms
            .values()
            .map(|vm| VmRecord {
                id: vm.id,
                mips: vm.mips,
                pes: vm.pes,
            })
            .collect();
        self.trace_log.log_jobs(&self.jobs);

        let roots: Vec<usize> = self
            .jobs
            .iter()
            .filter(|job| job.parents.is_empty() && !job.is_terminal())
            .map(|job| job.id)
            .collect();
        for job_id in roots {
            self.schedule_release(job_id);
        }
        if self.overhead.interval() > 0. {
            self.tick_pending = true;
            self.ctx.emit_self_now(SchedulingTick {});
        }
    }

    /// Asks the datacenter to destroy the VM after `delay`. Jobs running or waiting on it fail.
    pub fn request_vm_destroy(&mut self, vm_id: u32, delay: f64) {
        self.ctx.emit(VmDestroyRequest { vm_id }, self.datacenter, delay);
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn job(&self, job_id: usize) -> Option<&Job> {
        self.jobs.get(job_id)
    }

    /// Terminal jobs in the order they reached the terminal state.
    pub fn jobs_received(&self) -> impl Iterator<Item = &Job> {
        self.received.iter().map(|&id| &self.jobs[id])
    }

    pub fn vms(&self) -> impl Iterator<Item = &VmInfo> {
        self.vms.values()
    }

    pub fn scheduler_name(&self) -> &str {
        self.scheduler.name()
    }

    pub fn trace_log(&self) -> &TraceLog {
        &self.trace_log
    }

    pub fn is_finished(&self) -> bool {
        self.jobs.iter().all(|job| job.is_terminal())
    }

    pub fn unfinished_jobs(&self) -> Vec<usize> {
        self.jobs
            .iter()
            .filter(|job| !job.is_terminal())
            .map(|job| job.id)
            .collect()
    }

    /// Returns `true` while some job is waiting for release, for a VM or for its execution to end.
    pub fn has_activity(&self) -> bool {
        !self.releasing.is_empty()
            || !self.ready.is_empty()
            || self
                .jobs
                .iter()
                .any(|job| matches!(job.status, JobStatus::Ready | JobStatus::Queued | JobStatus::Executing))
    }

    fn schedule_release(&mut self, job_id: usize) {
        let depth = self.jobs[job_id].depth;
        let clustering_delay = self.overhead.clustering_delay(depth);
        let engine_delay = self.overhead.engine_delay(depth);
        let job = &mut self.jobs[job_id];
        job.clustering_delay = clustering_delay;
        job.engine_delay = engine_delay;
        self.releasing.insert(job_id);
        self.ctx
            .emit_self(JobReleased { job: job_id }, clustering_delay + engine_delay);
    }

    fn request_tick(&mut self) {
        if self.overhead.interval() == 0. && !self.tick_pending {
            self.tick_pending = true;
            self.ctx.emit_self_now(SchedulingTick {});
        }
    }

    fn on_job_released(&mut self, job_id: usize) {
        self.releasing.remove(&job_id);
        let now = self.ctx.time();
        if self.jobs[job_id].is_terminal() {
            return;
        }
        let queue_delay = self.overhead.queue_delay(self.jobs[job_id].depth);
        let job = &mut self.jobs[job_id];
        job.status = JobStatus::Ready;
        job.ready_time = Some(now);
        self.trace_log
            .log_event(TraceEvent::JobReleased { time: now, job: job_id });

        job.queue_delay = queue_delay;
        job.status = JobStatus::Queued;
        self.trace_log.log_event(TraceEvent::JobQueued {
            time: now,
            job: job_id,
            queue_delay,
        });
        log_debug!(self.ctx, "job {} is ready, queue delay {:.3}", job_id, queue_delay);
        self.ready.insert(job_id);
        self.request_tick();
    }

    fn on_tick(&mut self) {
        self.tick_pending = false;
        self.schedule();
        let interval = self.overhead.interval();
        if interval > 0. {
            if self.has_activity() {
                self.tick_pending = true;
                self.ctx.emit_self(SchedulingTick {}, interval);
            } else if !self.is_finished() {
                log_error!(self.ctx, "no progress possible, stuck jobs: {:?}", self.unfinished_jobs());
            }
        }
    }

    fn schedule(&mut self) {
        if self.ready.is_empty() {
            return;
        }
        let now = self.ctx.time();
        let snapshot: Vec<VmSnapshot> = self
            .vms
            .values()
            .filter(|vm| vm.alive)
            .map(|vm| VmSnapshot {
                id: vm.id,
                mips: vm.mips,
                pes: vm.pes,
                available_at: vm.available_at.max(now),
            })
            .collect();

        let mut ready_jobs = Vec::with_capacity(self.ready.len());
        let mut unservable = Vec::new();
        for &job_id in self.ready.iter() {
            let job = &self.jobs[job_id];
            let ready_job = ReadyJob {
                id: job.id,
                length: job.length,
                pes: job.pes,
                depth: job.depth,
                queue_delay: job.queue_delay,
            };
            if snapshot.iter().any(|vm| vm.can_serve(&ready_job)) {
                ready_jobs.push(ready_job);
            } else {
                unservable.push(job_id);
            }
        }
        for job_id in unservable {
            self.fail_job(
                job_id,
                JobFailReason::ResourceUnavailable {
                    reason: "no vm can serve the job".to_string(),
                },
            );
        }
        if ready_jobs.is_empty() {
            return;
        }

        let assignments = self.scheduler.select(&ready_jobs, &snapshot, now);
        log_trace!(
            self.ctx,
            "scheduler {} assigned {} of {} ready jobs",
            self.scheduler.name(),
            assignments.len(),
            ready_jobs.len()
        );
        for assignment in assignments {
            self.dispatch(assignment);
        }
    }

    fn dispatch(&mut self, assignment: Assignment) {
        let Assignment {
            job: job_id,
            vm: vm_id,
            estimated_finish,
        } = assignment;
        let vm_alive = self.vms.get(&vm_id).map_or(false, |vm| vm.alive);
        if !self.ready.contains(&job_id) || !vm_alive {
            log_error!(
                self.ctx,
                "scheduler {} returned invalid assignment of job {} to vm {}",
                self.scheduler.name(),
                job_id,
                vm_id
            );
            return;
        }
        self.ready.remove(&job_id);
        let now = self.ctx.time();

        let job = &mut self.jobs[job_id];
        job.vm_id = Some(vm_id);
        job.estimated_finish_time = Some(estimated_finish);
        job.submission_time = Some(now + job.queue_delay);
        let queue_delay = job.queue_delay;
        let mut cloudlet = Cloudlet::new(job_id as u64, job.length, job.pes, vm_id);
        cloudlet.input_files = job.input_files.clone();
        cloudlet.output_files = job.output_files.clone();

        if let Some(vm) = self.vms.get_mut(&vm_id) {
            vm.available_at = vm.available_at.max(estimated_finish);
            vm.outstanding += 1;
        }
        self.trace_log.log_event(TraceEvent::JobAssigned {
            time: now,
            job: job_id,
            vm: vm_id,
            estimated_finish,
        });
        log_debug!(
            self.ctx,
            "job {} assigned to vm {}, estimated finish {:.3}",
            job_id,
            vm_id,
            estimated_finish
        );
        self.ctx.emit(CloudletSubmit { cloudlet }, self.datacenter, queue_delay);
    }

    fn on_cloudlet_started(&mut self, cloudlet_id: u64, vm_id: u32, host_id: u32) {
        let now = self.ctx.time();
        let Some(job) = self.jobs.get_mut(cloudlet_id as usize) else {
            log_error!(self.ctx, "unknown job {} started", cloudlet_id);
            return;
        };
        if job.is_terminal() {
            return;
        }
        job.status = JobStatus::Executing;
        job.exec_start_time = Some(now);
        job.host_id = Some(host_id);
        self.trace_log.log_event(TraceEvent::JobStarted {
            time: now,
            job: job.id,
            vm: vm_id,
            host: host_id,
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn on_cloudlet_returned(
        &mut self,
        cloudlet_id: u64,
        vm_id: u32,
        host_id: u32,
        exec_start_time: f64,
        cpu_time: f64,
        file_transfer_time: f64,
        cost: f64,
    ) {
        let now = self.ctx.time();
        let job_id = cloudlet_id as usize;
        if let Some(vm) = self.vms.get_mut(&vm_id) {
            vm.release(now);
        }
        let Some(depth) = self.jobs.get(job_id).map(|job| job.depth) else {
            log_error!(self.ctx, "unknown job {} returned", cloudlet_id);
            return;
        };
        let post_delay = self.overhead.post_delay(depth);
        let job = &mut self.jobs[job_id];
        job.host_id = Some(host_id);
        job.exec_start_time = Some(exec_start_time);
        job.cpu_time = cpu_time;
        job.file_transfer_time = file_transfer_time;
        job.cost = cost;
        job.post_delay = post_delay;
        log_debug!(
            self.ctx,
            "job {} returned from vm {}, post-processing for {:.3}",
            job_id,
            vm_id,
            post_delay
        );
        self.ctx.emit_self(JobPostProcessed { job: job_id }, post_delay);
        self.request_tick();
    }

    fn on_job_post_processed(&mut self, job_id: usize) {
        let now = self.ctx.time();
        let job = &mut self.jobs[job_id];
        job.status = JobStatus::Success;
        job.finish_time = Some(now);
        self.received.push(job_id);
        self.trace_log.log_event(TraceEvent::JobFinished {
            time: now,
            job: job_id,
            vm: job.vm_id.unwrap_or_default(),
            cost: job.cost,
        });
        log_debug!(self.ctx, "job {} completed", job_id);

        let children: Vec<usize> = self.jobs[job_id].children.iter().copied().collect();
        for child in children {
            let ready = matches!(self.jobs[child].status, JobStatus::Created | JobStatus::Clustered)
                && !self.releasing.contains(&child)
                && self.jobs[child]
                    .parents
                    .iter()
                    .all(|&p| self.jobs[p].status == JobStatus::Success);
            if ready {
                self.schedule_release(child);
            }
        }
        if self.is_finished() {
            log_info!(self.ctx, "all {} jobs are completed", self.jobs.len());
        }
    }

    fn on_cloudlet_failed(&mut self, cloudlet_id: u64, vm_id: u32, reason: String) {
        let now = self.ctx.time();
        if let Some(vm) = self.vms.get_mut(&vm_id) {
            vm.release(now);
        }
        if (cloudlet_id as usize) < self.jobs.len() {
            self.fail_job(cloudlet_id as usize, JobFailReason::ResourceUnavailable { reason });
        } else {
            log_error!(self.ctx, "unknown job {} failed", cloudlet_id);
        }
        self.request_tick();
    }

    fn on_vm_destroyed(&mut self, vm_id: u32) {
        if let Some(vm) = self.vms.get_mut(&vm_id) {
            vm.alive = false;
        }
        log_info!(self.ctx, "vm {} destroyed", vm_id);
        self.request_tick();
    }

    /// Fails the job and every job that transitively depends on it.
    fn fail_job(&mut self, job_id: usize, reason: JobFailReason) {
        let mut queue = VecDeque::from([(job_id, reason)]);
        while let Some((id, reason)) = queue.pop_front() {
            if self.jobs[id].is_terminal() {
                continue;
            }
            let now = self.ctx.time();
            let message = match &reason {
                JobFailReason::ResourceUnavailable { reason } => reason.clone(),
                JobFailReason::ParentFailed { parent } => format!("parent job {} failed", parent),
            };
            self.jobs[id].fail(reason, now);
            match self.jobs[id].error() {
                Some(err) => log_warn!(self.ctx, "{}", err),
                None => log_debug!(self.ctx, "job {} failed: {}", id, message),
            }
            self.ready.remove(&id);
            self.received.push(id);
            self.trace_log.log_event(TraceEvent::JobFailed {
                time: now,
                job: id,
                reason: message,
            });
            for &child in self.jobs[id].children.iter() {
                queue.push_back((child, JobFailReason::ParentFailed { parent: id }));
            }
        }
    }
}

impl EventHandler for WorkflowEngine {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            JobReleased { job } => {
                self.on_job_released(job);
            }
            SchedulingTick {} => {
                self.on_tick();
            }
            JobPostProcessed { job } => {
                self.on_job_post_processed(job);
            }
            CloudletStarted { id, vm_id, host_id } => {
                self.on_cloudlet_started(id, vm_id, host_id);
            }
            CloudletReturned {
                id,
                vm_id,
                host_id,
                exec_start_time,
                cpu_time,
                file_transfer_time,
                cost,
                ..
            } => {
                self.on_cloudlet_returned(id, vm_id, host_id, exec_start_time, cpu_time, file_transfer_time, cost);
            }
            CloudletFailed { id, vm_id, reason } => {
                self.on_cloudlet_failed(id, vm_id, format!("{:?}", reason));
            }
            VmDestroyed { vm_id } => {
                self.on_vm_destroyed(vm_id);
            }
        })
    }
}
