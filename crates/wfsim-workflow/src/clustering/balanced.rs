use crate::clustering::{ClusteringAlgorithm, ClusteringParameters};
use crate::workflow::Workflow;

/// Horizontal clustering that balances the total length of jobs within a level.
///
/// A level of `n` tasks with cluster size `k` gets `ceil(n / k)` jobs. Tasks are taken longest first and put
/// into the job with the smallest total length that still has fewer than `k` tasks.
pub struct BalancedClustering {
    params: ClusteringParameters,
}

impl BalancedClustering {
    pub fn new(params: ClusteringParameters) -> Self {
        Self { params }
    }

    fn balance(workflow: &Workflow, level: &[usize], bins: usize, capacity: usize) -> Vec<Vec<usize>> {
        let mut tasks = level.to_vec();
        tasks.sort_by(|&a, &b| {
            workflow
                .task(b)
                .length
                .total_cmp(&workflow.task(a).length)
                .then(a.cmp(&b))
        });
        let mut groups: Vec<Vec<usize>> = vec![Vec::new(); bins];
        let mut loads = vec![0f64; bins];
        for task_id in tasks {
            let target = (0..bins)
                .filter(|&i| groups[i].len() < capacity)
                .min_by(|&i, &j| {
                    loads[i]
                        .total_cmp(&loads[j])
                        .then(groups[i].len().cmp(&groups[j].len()))
                        .then(i.cmp(&j))
                });
            if let Some(i) = target {
                loads[i] += workflow.task(task_id).length;
                groups[i].push(task_id);
            }
        }
        groups
    }
}

impl ClusteringAlgorithm for BalancedClustering {
    fn group(&self, workflow: &Workflow) -> Vec<Vec<usize>> {
        let mut groups = Vec::new();
        for (depth, level) in workflow.levels().into_iter().enumerate() {
            if level.is_empty() {
                continue;
            }
            let n = level.len();
            let size = self.params.size_at(depth);
            if size > 0 {
                let capacity = size as usize;
                groups.extend(Self::balance(workflow, &level, (n + capacity - 1) / capacity, capacity));
            } else if self.params.clusters_num > 0 {
                let bins = (self.params.clusters_num as usize).min(n);
                groups.extend(Self::balance(workflow, &level, bins, (n + bins - 1) / bins));
            } else {
                groups.extend(level.into_iter().map(|t| vec![t]));
            }
        }
        groups
    }
}
