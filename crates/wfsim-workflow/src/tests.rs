use std::collections::{BTreeMap, BTreeSet};

use rand::prelude::*;
use rand_pcg::Pcg64;

use crate::clustering::{ClusteringEngine, ClusteringMethod, ClusteringParameters};
use crate::job::{Job, JobStatus};
use crate::run_stats::RunStats;
use crate::scheduler::{estimate_completion, Assignment, ReadyJob, Scheduler, VmSnapshot};
use crate::scheduler_resolver::{default_scheduler_resolver, SchedulerParams, SchedulingAlgorithm};
use crate::schedulers::{FcfsScheduler, MaxMinScheduler, MctScheduler, MinMinScheduler, RoundRobinScheduler};
use crate::workflow::{topological_sort, Workflow};

const PRECISION: f64 = 1e-9;

fn assert_float_eq(x: f64, y: f64, eps: f64) {
    assert!(x >= y - eps && x <= y + eps, "{} != {}", x, y);
}

fn gen_workflow(rng: &mut Pcg64, num_tasks: usize) -> Workflow {
    let mut workflow = Workflow::new();
    for i in 0..num_tasks {
        workflow.add_task(&format!("task{}", i), rng.gen_range(1..10000) as f64);
    }
    for child in 1..num_tasks {
        for parent in 0..child {
            if rng.gen_range(0..num_tasks) < 2 {
                workflow.add_dependency(parent, child).unwrap();
            }
        }
    }
    workflow.finalize().unwrap();
    workflow
}

fn cluster(workflow: &Workflow, method: ClusteringMethod, size: i64) -> Vec<Job> {
    ClusteringEngine::new(ClusteringParameters::new(method, size))
        .unwrap()
        .run(workflow)
        .unwrap()
}

fn job_of_task(jobs: &[Job], num_tasks: usize) -> Vec<usize> {
    let mut task_job = vec![usize::MAX; num_tasks];
    for job in jobs {
        for &task in job.task_ids.iter() {
            assert_eq!(task_job[task], usize::MAX, "task {} is in two jobs", task);
            task_job[task] = job.id;
        }
    }
    assert!(task_job.iter().all(|&j| j != usize::MAX));
    task_job
}

fn check_job_graph(workflow: &Workflow, jobs: &[Job]) {
    let task_job = job_of_task(jobs, workflow.len());
    let parents: Vec<BTreeSet<usize>> = jobs.iter().map(|j| j.parents.clone()).collect();
    assert!(topological_sort(&parents).is_ok());
    for job in jobs {
        assert_eq!(job.status, JobStatus::Clustered);
        let has_task_parents = job.task_ids.iter().any(|&t| !workflow.task(t).parents.is_empty());
        if !job.parents.is_empty() {
            assert!(has_task_parents);
        }
        for &parent in job.parents.iter() {
            assert!(jobs[parent].children.contains(&job.id));
        }
        // every cross-job task edge is reflected in the job graph
        for &task in job.task_ids.iter() {
            for &parent_task in workflow.task(task).parents.iter() {
                let parent_job = task_job[parent_task];
                if parent_job != job.id {
                    assert!(job.parents.contains(&parent_job));
                }
            }
        }
        let length: f64 = job.task_ids.iter().map(|&t| workflow.task(t).length).sum();
        assert_float_eq(job.length, length, PRECISION);
    }
}

#[test]
fn test_clustering_keeps_job_graph_acyclic() {
    let mut rng = Pcg64::seed_from_u64(123);
    for _ in 0..30 {
        let num_tasks = rng.gen_range(1..40);
        let workflow = gen_workflow(&mut rng, num_tasks);
        for method in [
            ClusteringMethod::None,
            ClusteringMethod::Horizontal,
            ClusteringMethod::Vertical,
            ClusteringMethod::Balanced,
        ] {
            for size in [-1, 0, 1, 2, 3, 5] {
                let jobs = cluster(&workflow, method, size);
                check_job_graph(&workflow, &jobs);
            }
        }
    }
}

#[test]
fn test_no_clustering_is_identity() {
    let mut rng = Pcg64::seed_from_u64(7);
    for _ in 0..10 {
        let workflow = gen_workflow(&mut rng, 25);
        for (method, size) in [(ClusteringMethod::None, 4), (ClusteringMethod::Horizontal, 0)] {
            let jobs = cluster(&workflow, method, size);
            assert_eq!(jobs.len(), workflow.len());
            let task_job = job_of_task(&jobs, workflow.len());
            for task in workflow.tasks() {
                let job = &jobs[task_job[task.id]];
                assert_eq!(job.task_ids, vec![task.id]);
                assert_eq!(job.depth, task.depth);
                let parents: BTreeSet<usize> = task.parents.iter().map(|&p| task_job[p]).collect();
                assert_eq!(job.parents, parents);
            }
        }
    }
}

#[test]
fn test_horizontal_clustering_level_sizes() {
    let mut rng = Pcg64::seed_from_u64(42);
    for _ in 0..10 {
        let workflow = gen_workflow(&mut rng, 50);
        let levels = workflow.levels();
        for k in 1..6usize {
            let jobs = cluster(&workflow, ClusteringMethod::Horizontal, k as i64);
            let mut per_level: BTreeMap<usize, usize> = BTreeMap::new();
            for job in jobs.iter() {
                assert!(job.task_ids.len() <= k);
                assert!(job.task_ids.iter().all(|&t| workflow.task(t).depth == job.depth));
                *per_level.entry(job.depth).or_default() += 1;
            }
            for (depth, level) in levels.iter().enumerate() {
                let n = level.len();
                assert_eq!(per_level.get(&depth).copied().unwrap_or(0), (n + k - 1) / k);
            }
        }
    }
}

#[test]
fn test_horizontal_clustering_by_number() {
    let mut workflow = Workflow::new();
    for i in 0..7 {
        workflow.add_task(&i.to_string(), 10.);
    }
    workflow.finalize().unwrap();
    let params = ClusteringParameters {
        method: ClusteringMethod::Horizontal,
        clusters_num: 3,
        ..Default::default()
    };
    let jobs = ClusteringEngine::new(params).unwrap().run(&workflow).unwrap();
    assert_eq!(jobs.len(), 3);
    assert_eq!(jobs[0].task_ids, vec![0, 3, 6]);
    assert_eq!(jobs[1].task_ids, vec![1, 4]);
    assert_eq!(jobs[2].task_ids, vec![2, 5]);
}

#[test]
fn test_per_level_sizes() {
    let mut workflow = Workflow::new();
    let root = workflow.add_task("root", 1.);
    for i in 0..6 {
        let t = workflow.add_task(&format!("t{}", i), 1.);
        workflow.add_dependency(root, t).unwrap();
    }
    workflow.finalize().unwrap();
    let mut params = ClusteringParameters::new(ClusteringMethod::Horizontal, 1);
    params.level_sizes.insert(1, 4);
    let jobs = ClusteringEngine::new(params).unwrap().run(&workflow).unwrap();
    assert_eq!(jobs.len(), 3);
    assert_eq!(jobs[1].task_ids.len(), 4);
    assert_eq!(jobs[2].task_ids.len(), 2);

    let mut params = ClusteringParameters::new(ClusteringMethod::Vertical, 2);
    params.level_sizes.insert(1, 4);
    assert!(ClusteringEngine::new(params).is_err());
}

#[test]
fn test_vertical_clustering_merges_chains() {
    // 0 -> 1 -> 2 -> 3 -> 4, 4 -> {5, 6}
    let mut workflow = Workflow::new();
    for i in 0..7 {
        workflow.add_task(&i.to_string(), 1. + i as f64);
    }
    for i in 0..4 {
        workflow.add_dependency(i, i + 1).unwrap();
    }
    workflow.add_dependency(4, 5).unwrap();
    workflow.add_dependency(4, 6).unwrap();
    workflow.add_output_file(0, "a", 100).unwrap();
    workflow.add_input_file(1, "a", 100).unwrap();
    workflow.add_input_file(0, "raw", 100).unwrap();
    workflow.finalize().unwrap();

    let jobs = cluster(&workflow, ClusteringMethod::Vertical, 3);
    let groups: Vec<Vec<usize>> = jobs.iter().map(|j| j.task_ids.clone()).collect();
    assert_eq!(groups, vec![vec![0, 1, 2], vec![3, 4], vec![5], vec![6]]);
    assert_eq!(jobs[0].depth, 2);
    assert_float_eq(jobs[0].length, 6., PRECISION);
    // file produced and consumed inside the job is not an input
    let inputs: Vec<&str> = jobs[0].input_files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(inputs, vec!["raw"]);
    assert_eq!(jobs[0].output_files.len(), 1);
    assert_eq!(jobs[1].parents, BTreeSet::from([0]));
    assert_eq!(jobs[2].parents, BTreeSet::from([1]));

    let jobs = cluster(&workflow, ClusteringMethod::Vertical, 1);
    assert_eq!(jobs.len(), workflow.len());
}

#[test]
fn test_balanced_clustering_balances_length() {
    let mut workflow = Workflow::new();
    for length in [10., 9., 8., 7., 6., 5.] {
        workflow.add_task("t", length);
    }
    workflow.finalize().unwrap();

    let jobs = cluster(&workflow, ClusteringMethod::Balanced, 2);
    assert_eq!(jobs.len(), 3);
    let mut lengths: Vec<f64> = jobs.iter().map(|j| j.length).collect();
    lengths.sort_by(|a, b| a.total_cmp(b));
    assert_eq!(lengths, vec![15., 15., 15.]);
    assert!(jobs.iter().all(|j| j.task_ids.len() == 2));

    let params = ClusteringParameters {
        method: ClusteringMethod::Balanced,
        clusters_num: 2,
        ..Default::default()
    };
    let jobs = ClusteringEngine::new(params).unwrap().run(&workflow).unwrap();
    assert_eq!(jobs.len(), 2);
    let lengths: Vec<f64> = jobs.iter().map(|j| j.length).collect();
    assert_float_eq(lengths[0] + lengths[1], 45., PRECISION);
    assert!((lengths[0] - lengths[1]).abs() <= 1.);
}

#[test]
fn test_clustering_requires_finalized_workflow() {
    let mut workflow = Workflow::new();
    workflow.add_task("a", 1.);
    let engine = ClusteringEngine::new(ClusteringParameters::default()).unwrap();
    assert!(engine.run(&workflow).is_err());
}

////////////////////////////////////////////////////////////////////////////////

fn ready_job(id: usize, length: f64, queue_delay: f64) -> ReadyJob {
    ReadyJob {
        id,
        length,
        pes: 1,
        depth: 0,
        queue_delay,
    }
}

fn vm(id: u32, mips: f64, available_at: f64) -> VmSnapshot {
    VmSnapshot {
        id,
        mips,
        pes: 1,
        available_at,
    }
}

#[test]
fn test_estimate_completion() {
    let job = ready_job(0, 1000., 2.);
    // idle vm: queue delay, then execution
    assert_eq!(estimate_completion(&job, &vm(0, 500., 1.), 1.), Some(1. + 2. + 2.));
    // queue delay overlaps the wait for a busy vm
    assert_eq!(estimate_completion(&job, &vm(0, 500., 3.), 0.), Some(3. + 2.));
    assert_eq!(estimate_completion(&job, &vm(0, 500., 1.), 0.), Some(2. + 2.));
    assert_eq!(estimate_completion(&job, &vm(0, 0., 0.), 0.), None);
    let mut no_pes = vm(1, 100., 0.);
    no_pes.pes = 0;
    assert_eq!(estimate_completion(&job, &no_pes, 0.), None);
    let mut wide = ready_job(1, 1000., 0.);
    wide.pes = 2;
    assert_eq!(estimate_completion(&wide, &vm(2, 100., 0.), 0.), None);
}

#[test]
fn test_min_min_exhaustive() {
    let mut rng = Pcg64::seed_from_u64(555);
    for _ in 0..200 {
        let jobs: Vec<ReadyJob> = (0..3)
            .map(|i| ready_job(i, rng.gen_range(1..5) as f64 * 100., rng.gen_range(0..3) as f64))
            .collect();
        let vms: Vec<VmSnapshot> = (0..2)
            .map(|i| vm(i, rng.gen_range(1..3) as f64 * 100., rng.gen_range(0..4) as f64))
            .collect();
        let assignments = MinMinScheduler::new().select(&jobs, &vms, 0.);
        assert_eq!(assignments.len(), 3);

        // replay: each decision must be the minimum over all remaining pairs
        let mut state = vms.clone();
        let mut remaining: Vec<usize> = (0..3).collect();
        for assignment in assignments.iter() {
            let mut best: Option<(f64, usize, u32)> = None;
            for &j in remaining.iter() {
                for v in state.iter() {
                    let finish = estimate_completion(&jobs[j], v, 0.).unwrap();
                    let candidate = (finish, j, v.id);
                    if best.map_or(true, |b| {
                        candidate.0 < b.0 || (candidate.0 == b.0 && (candidate.1, candidate.2) < (b.1, b.2))
                    }) {
                        best = Some(candidate);
                    }
                }
            }
            let (finish, job, vm_id) = best.unwrap();
            assert_eq!((assignment.job, assignment.vm), (job, vm_id));
            assert_float_eq(assignment.estimated_finish, finish, PRECISION);
            state[vm_id as usize].available_at = finish;
            remaining.retain(|&j| j != job);
        }
    }
}

#[test]
fn test_min_min_queue_delays_on_shared_vm() {
    let jobs = vec![ready_job(0, 100., 2.), ready_job(1, 100., 1.5)];
    let vms = vec![vm(0, 100., 0.), vm(1, 50., 0.)];
    let assignments = MinMinScheduler::new().select(&jobs, &vms, 0.);
    // job 1 reaches vm 0 at 1.5 and ends at 2.5, job 0 arrives at 2 and waits for it
    assert_eq!(
        assignments,
        vec![
            Assignment {
                job: 1,
                vm: 0,
                estimated_finish: 2.5
            },
            Assignment {
                job: 0,
                vm: 0,
                estimated_finish: 3.5
            },
        ]
    );
}

#[test]
fn test_min_min_tie_break() {
    let jobs = vec![ready_job(2, 100., 0.), ready_job(1, 100., 0.)];
    let vms = vec![vm(0, 100., 0.), vm(1, 100., 0.)];
    let assignments = MinMinScheduler::new().select(&jobs, &vms, 0.);
    assert_eq!((assignments[0].job, assignments[0].vm), (1, 0));
    assert_eq!((assignments[1].job, assignments[1].vm), (2, 1));
}

#[test]
fn test_min_min_skips_unservable() {
    let jobs = vec![ready_job(0, 100., 0.)];
    let vms = vec![vm(0, 0., 0.)];
    assert!(MinMinScheduler::new().select(&jobs, &vms, 0.).is_empty());
    assert!(MinMinScheduler::new().select(&jobs, &[], 0.).is_empty());
}

#[test]
fn test_max_min_prefers_long_jobs() {
    let jobs = vec![ready_job(0, 100., 0.), ready_job(1, 1000., 0.)];
    let vms = vec![vm(0, 100., 0.), vm(1, 200., 0.)];
    let assignments = MaxMinScheduler::new().select(&jobs, &vms, 0.);
    assert_eq!((assignments[0].job, assignments[0].vm), (1, 1));
    assert_eq!((assignments[1].job, assignments[1].vm), (0, 0));

    let assignments = MinMinScheduler::new().select(&jobs, &vms, 0.);
    assert_eq!((assignments[0].job, assignments[0].vm), (0, 1));
    assert_eq!((assignments[1].job, assignments[1].vm), (1, 1));
}

#[test]
fn test_mct_fcfs_round_robin() {
    let jobs = vec![ready_job(0, 100., 0.), ready_job(1, 100., 0.), ready_job(2, 100., 0.)];
    let vms = vec![vm(0, 100., 5.), vm(1, 50., 0.)];

    let mct = MctScheduler::new().select(&jobs, &vms, 0.);
    assert_eq!(mct.iter().map(|a| a.vm).collect::<Vec<_>>(), vec![1, 1, 0]);

    let fcfs = FcfsScheduler::new().select(&jobs, &vms, 0.);
    assert_eq!(fcfs.iter().map(|a| a.vm).collect::<Vec<_>>(), vec![1, 1, 1]);

    let mut rr = RoundRobinScheduler::new();
    let first = rr.select(&jobs, &vms, 0.);
    assert_eq!(first.iter().map(|a| a.vm).collect::<Vec<_>>(), vec![0, 1, 0]);
    let second = rr.select(&jobs[..1], &vms, 0.);
    assert_eq!(second[0].vm, 1);
}

#[test]
fn test_scheduler_resolver() {
    assert_eq!("MinMin".parse::<SchedulingAlgorithm>().unwrap(), SchedulingAlgorithm::MinMin);
    assert_eq!("max_min".parse::<SchedulingAlgorithm>().unwrap(), SchedulingAlgorithm::MaxMin);
    assert_eq!("ROUND-ROBIN".parse::<SchedulingAlgorithm>().unwrap(), SchedulingAlgorithm::RoundRobin);
    assert!("Heft".parse::<SchedulingAlgorithm>().is_err());

    let params: SchedulerParams = "Fcfs[seed=3,mode=fast]".parse().unwrap();
    assert_eq!(params.name(), "Fcfs");
    assert_eq!(params.get::<u64, _>("seed"), Some(3));
    assert_eq!(params.to_string(), "Fcfs[mode=fast,seed=3]");
    assert!("Fcfs[seed".parse::<SchedulerParams>().is_err());

    let scheduler = default_scheduler_resolver(&params).unwrap();
    assert_eq!(scheduler.name(), "Fcfs");
    assert!(default_scheduler_resolver(&SchedulerParams::new("Unknown")).is_none());
}

#[test]
fn test_run_stats() {
    let mut a = Job::new(0, vec![0], 0, 100.);
    a.status = JobStatus::Success;
    a.vm_id = Some(0);
    a.exec_start_time = Some(1.);
    a.finish_time = Some(4.);
    a.cpu_time = 2.;
    a.queue_delay = 0.5;
    a.post_delay = 1.;
    a.cost = 6.;
    let mut b = Job::new(1, vec![1], 1, 100.);
    b.status = JobStatus::Success;
    b.vm_id = Some(0);
    b.exec_start_time = Some(4.);
    b.finish_time = Some(9.);
    b.cpu_time = 5.;
    b.cost = 15.;
    let mut c = Job::new(2, vec![2], 1, 100.);
    c.fail(crate::job::JobFailReason::ParentFailed { parent: 0 }, 12.);

    let stats = RunStats::from_jobs(&[a, b, c]);
    assert_float_eq(stats.makespan, 8., PRECISION);
    assert_float_eq(stats.total_execution_time, 7., PRECISION);
    assert_float_eq(stats.total_queue_delay, 0.5, PRECISION);
    assert_float_eq(stats.total_post_delay, 1., PRECISION);
    assert_float_eq(stats.total_cost, 21., PRECISION);
    assert_eq!(stats.successful_jobs, 2);
    assert_eq!(stats.failed_jobs, 1);
    assert_eq!(stats.used_vms, 1);

    let none: Vec<Job> = Vec::new();
    assert_eq!(RunStats::from_jobs(&none), RunStats::default());
}
