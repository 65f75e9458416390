use std::io::Write;

use clap::Parser;
use env_logger::Builder;
use rand::prelude::*;
use rand_pcg::Pcg64;

use wfsim_workflow::clustering::ClusteringMethod;
use wfsim_workflow::config::SimulationConfig;
use wfsim_workflow::job::JobStatus;
use wfsim_workflow::workflow::Workflow;
use wfsim_workflow::{Error, Result, SimulationResult, WorkflowSimulation};

#[derive(Parser, Debug)]
#[command(about, long_about = None)]
/// Simulates the execution of a synthetic layered workflow and prints per-job timings.
struct Args {
    /// Path to YAML config, built-in defaults are used if omitted
    #[arg(short, long)]
    config: Option<String>,

    /// Number of VMs (overrides config)
    #[arg(long)]
    vms: Option<u32>,

    /// Clustering method: none, horizontal, vertical or balanced (overrides config)
    #[arg(long)]
    clustering: Option<String>,

    /// Maximum number of tasks per job (overrides config)
    #[arg(long = "cluster-size")]
    cluster_size: Option<i64>,

    /// Scheduling algorithm, e.g. MinMin or RoundRobin (overrides config)
    #[arg(long)]
    scheduler: Option<String>,

    /// Number of workflow tasks
    #[arg(long, default_value_t = 30)]
    tasks: usize,

    /// Number of workflow levels
    #[arg(long, default_value_t = 4)]
    levels: usize,

    /// Random seed (overrides config)
    #[arg(long)]
    seed: Option<u64>,

    /// Save trace log to this file
    #[arg(long = "trace-log")]
    trace_log: Option<String>,
}

fn parse_clustering(s: &str) -> Result<ClusteringMethod> {
    match s.to_lowercase().as_str() {
        "none" => Ok(ClusteringMethod::None),
        "horizontal" => Ok(ClusteringMethod::Horizontal),
        "vertical" => Ok(ClusteringMethod::Vertical),
        "balanced" => Ok(ClusteringMethod::Balanced),
        _ => Err(Error::InvalidParameter(format!("unknown clustering method `{}`", s))),
    }
}

/// Builds a workflow where every task of a level reads outputs of one to three tasks of the previous level.
fn synthetic_workflow(tasks: usize, levels: usize, seed: u64) -> Result<Workflow> {
    let mut rng = Pcg64::seed_from_u64(seed);
    let levels = levels.clamp(1, tasks.max(1));
    let mut workflow = Workflow::new();
    let mut previous: Vec<usize> = Vec::new();
    for level in 0..levels {
        let width = tasks / levels + usize::from(level < tasks % levels);
        let mut current = Vec::with_capacity(width);
        for i in 0..width {
            let task = workflow.add_task(&format!("task_{}_{}", level, i), rng.gen_range(1000..20000) as f64);
            workflow.add_output_file(task, &format!("data_{}_{}", level, i), rng.gen_range(1_000_000..50_000_000))?;
            if previous.is_empty() {
                workflow.add_input_file(task, &format!("input_{}", i), rng.gen_range(1_000_000..10_000_000))?;
            } else {
                let fan_in = rng.gen_range(1..=previous.len().min(3));
                for &parent in previous.choose_multiple(&mut rng, fan_in) {
                    let file = workflow.task(parent).output_files[0].clone();
                    workflow.add_input_file(task, &file.name, file.size)?;
                }
            }
            current.push(task);
        }
        previous = current;
    }
    workflow.add_file_dependencies()?;
    workflow.finalize()?;
    Ok(workflow)
}

fn print_result(result: &SimulationResult) {
    println!(
        "{:>6} {:>10} {:>8} {:>6} {:>6} {:>10} {:>10} {:>10} {:>6} {:>10}",
        "Job", "Tasks", "Status", "Host", "VM", "CPU time", "Start", "Finish", "Depth", "Cost"
    );
    for job in result.jobs.iter() {
        let status = match job.status {
            JobStatus::Success => "SUCCESS",
            _ => "FAILED",
        };
        let fmt_opt = |v: Option<f64>| v.map_or("-".to_string(), |v| format!("{:.2}", v));
        println!(
            "{:>6} {:>10} {:>8} {:>6} {:>6} {:>10.2} {:>10} {:>10} {:>6} {:>10.2}",
            job.id,
            job.task_ids.len(),
            status,
            job.host_id.map_or("-".to_string(), |h| h.to_string()),
            job.vm_id.map_or("-".to_string(), |v| v.to_string()),
            job.cpu_time,
            fmt_opt(job.exec_start_time),
            fmt_opt(job.finish_time),
            job.depth,
            job.cost
        );
    }
    let stats = &result.stats;
    println!(
        "\nmakespan {:.2}, queue delay {:.2}, post delay {:.2}, execution time {:.2}, cost {:.2}, \
         {} succeeded, {} failed, {} vms used",
        stats.makespan,
        stats.total_queue_delay,
        stats.total_post_delay,
        stats.total_execution_time,
        stats.total_cost,
        stats.successful_jobs,
        stats.failed_jobs,
        stats.used_vms
    );
}

fn main() -> Result<()> {
    Builder::from_default_env()
        .format(|buf, record| writeln!(buf, "{}", record.args()))
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => SimulationConfig::from_file(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(vms) = args.vms {
        if let Some(group) = config.vms.first_mut() {
            group.count = vms;
            config.vms.truncate(1);
        }
    }
    if let Some(method) = &args.clustering {
        config.clustering.method = parse_clustering(method)?;
    }
    if let Some(size) = args.cluster_size {
        config.clustering.clusters_size = size;
    }
    if let Some(scheduler) = &args.scheduler {
        config.scheduler = scheduler.parse()?;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    let workflow = synthetic_workflow(args.tasks, args.levels, config.seed)?;
    println!(
        "Workflow: {} tasks, {} levels; clustering {:?} (size {}); scheduler {}; {} vms\n",
        workflow.len(),
        workflow.levels().len(),
        config.clustering.method,
        config.clustering.clusters_size,
        config.scheduler,
        config.vm_count()
    );

    let mut sim = WorkflowSimulation::new(config)?;
    let engine = sim.init(workflow)?;
    let result = sim.run()?;
    print_result(&result);
    if let Some(path) = &args.trace_log {
        engine.borrow().trace_log().save_to_file(path)?;
        log::info!("trace log saved to {}", path);
    }
    Ok(())
}
