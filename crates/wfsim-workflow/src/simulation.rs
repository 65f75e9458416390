//! Facade wiring the datacenter, the clustering engine and the workflow engine into one simulation.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;
use sugars::{rc, refcell};

use wfsim_cloud::allocation::allocation_policy_resolver;
use wfsim_cloud::Datacenter;
use wfsim_core::{Id, Simulation, SimulationContext};

use crate::clustering::ClusteringEngine;
use crate::config::SimulationConfig;
use crate::engine::{VmInfo, WorkflowEngine};
use crate::error::{Error, Result};
use crate::job::{Job, JobStatus};
use crate::overhead::OverheadInjector;
use crate::run_stats::RunStats;
use crate::scheduler_resolver::scheduler_resolver;
use crate::workflow::Workflow;

/// Terminal jobs in the order they finished, with aggregated metrics.
#[derive(Serialize, Clone, Debug)]
pub struct SimulationResult {
    pub jobs: Vec<Job>,
    pub stats: RunStats,
}

pub struct WorkflowSimulation {
    sim: Simulation,
    config: SimulationConfig,
    datacenter: Rc<RefCell<Datacenter>>,
    engine_ctx: Option<SimulationContext>,
    engine: Option<Rc<RefCell<WorkflowEngine>>>,
}

impl WorkflowSimulation {
    /// Validates the config, creates the datacenter and places the configured VMs.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let mut sim = Simulation::new(config.seed);
        let engine_ctx = sim.create_context("engine");
        let datacenter = rc!(refcell!(Datacenter::new(
            config.datacenter.characteristics.clone(),
            config.datacenter.build_hosts(),
            config.datacenter.build_storage(),
            config.file_system,
            allocation_policy_resolver(config.datacenter.vm_allocation),
            sim.create_context("datacenter"),
        )));
        sim.add_handler("datacenter", datacenter.clone());
        for vm in config.vms.iter() {
            for _ in 0..vm.count {
                datacenter.borrow_mut().create_vm(vm.spec(engine_ctx.id()));
            }
        }
        Ok(Self {
            sim,
            config,
            datacenter,
            engine_ctx: Some(engine_ctx),
            engine: None,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn datacenter(&self) -> Rc<RefCell<Datacenter>> {
        self.datacenter.clone()
    }

    pub fn datacenter_id(&self) -> Id {
        self.datacenter.borrow().id()
    }

    pub fn engine(&self) -> Option<Rc<RefCell<WorkflowEngine>>> {
        self.engine.clone()
    }

    /// Clusters the workflow into jobs, stages workflow inputs on the datacenter storage and starts the engine.
    pub fn init(&mut self, mut workflow: Workflow) -> Result<Rc<RefCell<WorkflowEngine>>> {
        self.check_not_initialized()?;
        if !workflow.is_finalized() {
            workflow.finalize()?;
        }
        let jobs = ClusteringEngine::new(self.config.clustering.clone())?.run(&workflow)?;
        for file in workflow.input_files() {
            self.datacenter.borrow_mut().register_input_file(&file);
        }
        self.init_jobs(jobs)
    }

    /// Starts the engine on already formed jobs, skipping clustering.
    ///
    /// Job ids must match their positions and all dependency references must be valid. Acyclicity is not
    /// checked: a cyclic job graph makes [`run`](Self::run) report a dependency deadlock.
    pub fn init_jobs(&mut self, mut jobs: Vec<Job>) -> Result<Rc<RefCell<WorkflowEngine>>> {
        self.check_not_initialized()?;
        for (idx, job) in jobs.iter().enumerate() {
            if job.id != idx {
                return Err(Error::InvalidWorkflow(format!("job at position {} has id {}", idx, job.id)));
            }
            if let Some(bad) = job.parents.iter().chain(job.children.iter()).find(|&&j| j >= jobs.len()) {
                return Err(Error::InvalidWorkflow(format!("job {} references unknown job {}", idx, bad)));
            }
        }
        for job in jobs.iter_mut() {
            if job.status == JobStatus::Created {
                job.status = JobStatus::Clustered;
            }
        }

        let overhead = OverheadInjector::new(self.config.overhead.clone(), self.config.seed)?;
        let ctx = self
            .engine_ctx
            .take()
            .ok_or_else(|| Error::InvalidParameter("simulation is already initialized".to_string()))?;
        let vms = self
            .datacenter
            .borrow()
            .vms()
            .filter(|vm| vm.is_running())
            .map(|vm| VmInfo::new(vm.id, vm.spec.mips, vm.spec.pes))
            .collect();
        let engine = rc!(refcell!(WorkflowEngine::new(
            jobs,
            vms,
            self.datacenter_id(),
            scheduler_resolver(self.config.scheduler),
            overhead,
            ctx,
        )));
        self.sim.add_handler("engine", engine.clone());
        engine.borrow_mut().start();
        self.engine = Some(engine.clone());
        Ok(engine)
    }

    /// Destroys the VM at `delay` from now.
    pub fn destroy_vm(&mut self, vm_id: u32, delay: f64) -> Result<()> {
        let engine = self.engine_or_err()?;
        engine.borrow_mut().request_vm_destroy(vm_id, delay);
        Ok(())
    }

    /// Runs the simulation until no events remain.
    ///
    /// Fails with [`Error::DependencyDeadlock`] if some jobs never reached a terminal state.
    pub fn run(&mut self) -> Result<SimulationResult> {
        let engine = self.engine_or_err()?;
        self.sim.step_until_no_events();
        let engine = engine.borrow();
        if !engine.is_finished() {
            return Err(Error::DependencyDeadlock {
                stuck_jobs: engine.unfinished_jobs(),
            });
        }
        let jobs: Vec<Job> = engine.jobs_received().cloned().collect();
        let stats = RunStats::from_jobs(&jobs);
        log::info!(
            "simulation finished at {:.3}: {} successful, {} failed jobs, makespan {:.3}",
            self.sim.time(),
            stats.successful_jobs,
            stats.failed_jobs,
            stats.makespan
        );
        Ok(SimulationResult { jobs, stats })
    }

    pub fn step(&mut self) -> bool {
        self.sim.step()
    }

    pub fn time(&self) -> f64 {
        self.sim.time()
    }

    pub fn event_count(&self) -> u64 {
        self.sim.event_count()
    }

    fn check_not_initialized(&self) -> Result<()> {
        if self.engine_ctx.is_none() {
            return Err(Error::InvalidParameter("simulation is already initialized".to_string()));
        }
        Ok(())
    }

    fn engine_or_err(&self) -> Result<Rc<RefCell<WorkflowEngine>>> {
        self.engine
            .clone()
            .ok_or_else(|| Error::InvalidParameter("simulation is not initialized".to_string()))
    }
}
