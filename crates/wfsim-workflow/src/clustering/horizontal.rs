use crate::clustering::{ClusteringAlgorithm, ClusteringParameters};
use crate::workflow::Workflow;

/// Groups tasks of the same depth.
///
/// With a positive cluster size `k` every level of `n` tasks becomes `ceil(n / k)` jobs of consecutive task ids.
/// Otherwise, with a positive `clusters_num`, tasks of a level are dealt round-robin into that many jobs.
pub struct HorizontalClustering {
    params: ClusteringParameters,
}

impl HorizontalClustering {
    pub fn new(params: ClusteringParameters) -> Self {
        Self { params }
    }
}

impl ClusteringAlgorithm for HorizontalClustering {
    fn group(&self, workflow: &Workflow) -> Vec<Vec<usize>> {
        let mut groups = Vec::new();
        for (depth, level) in workflow.levels().into_iter().enumerate() {
            let size = self.params.size_at(depth);
            if size > 0 {
                groups.extend(level.chunks(size as usize).map(|c| c.to_vec()));
            } else if self.params.clusters_num > 0 && !level.is_empty() {
                let bins = (self.params.clusters_num as usize).min(level.len());
                let mut level_groups = vec![Vec::new(); bins];
                for (i, task_id) in level.into_iter().enumerate() {
                    level_groups[i % bins].push(task_id);
                }
                groups.extend(level_groups);
            } else {
                groups.extend(level.into_iter().map(|t| vec![t]));
            }
        }
        groups
    }
}
