use crate::clustering::ClusteringAlgorithm;
use crate::workflow::Workflow;

/// Merges pipelines: a task is followed into its only child as long as that child has no other parent,
/// up to `size` tasks per job.
pub struct VerticalClustering {
    size: i64,
}

impl VerticalClustering {
    pub fn new(size: i64) -> Self {
        Self { size }
    }
}

impl ClusteringAlgorithm for VerticalClustering {
    fn group(&self, workflow: &Workflow) -> Vec<Vec<usize>> {
        if self.size <= 1 {
            return workflow.tasks().iter().map(|t| vec![t.id]).collect();
        }
        let order = match workflow.topological_order() {
            Ok(order) => order,
            Err(_) => return workflow.tasks().iter().map(|t| vec![t.id]).collect(),
        };
        let mut assigned = vec![false; workflow.len()];
        let mut groups = Vec::new();
        for task_id in order {
            if assigned[task_id] {
                continue;
            }
            assigned[task_id] = true;
            let mut group = vec![task_id];
            let mut current = task_id;
            while (group.len() as i64) < self.size {
                let task = workflow.task(current);
                if task.children.len() != 1 {
                    break;
                }
                let Some(&child) = task.children.iter().next() else {
                    break;
                };
                if workflow.task(child).parents.len() != 1 || assigned[child] {
                    break;
                }
                assigned[child] = true;
                group.push(child);
                current = child;
            }
            groups.push(group);
        }
        groups
    }
}
