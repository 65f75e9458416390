//! Workflow graph.

use std::collections::{BTreeSet, VecDeque};

use wfsim_cloud::FileItem;

use crate::error::{Error, Result};
use crate::task::Task;

/// Topological order of a graph given as `parents` lists, or the nodes left on a cycle.
pub(crate) fn topological_sort(parents: &[BTreeSet<usize>]) -> std::result::Result<Vec<usize>, Vec<usize>> {
    let n = parents.len();
    let mut children = vec![Vec::new(); n];
    let mut in_degree = vec![0; n];
    for (node, ps) in parents.iter().enumerate() {
        in_degree[node] = ps.len();
        for &p in ps.iter() {
            children[p].push(node);
        }
    }
    let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(node) = queue.pop_front() {
        order.push(node);
        for &child in children[node].iter() {
            in_degree[child] -= 1;
            if in_degree[child] == 0 {
                queue.push_back(child);
            }
        }
    }
    if order.len() == n {
        Ok(order)
    } else {
        Err((0..n).filter(|&i| in_degree[i] > 0).collect())
    }
}

/// Already parsed workflow: an arena of tasks connected by dependency edges.
#[derive(Clone, Debug, Default)]
pub struct Workflow {
    tasks: Vec<Task>,
    finalized: bool,
}

impl Workflow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds task with given amount of computation in MI, returns its id.
    pub fn add_task(&mut self, name: &str, length: f64) -> usize {
        let id = self.tasks.len();
        self.tasks.push(Task::new(id, name, length));
        self.finalized = false;
        id
    }

    fn check_task(&self, task_id: usize) -> Result<()> {
        if task_id < self.tasks.len() {
            Ok(())
        } else {
            Err(Error::InvalidWorkflow(format!("unknown task {}", task_id)))
        }
    }

    pub fn add_input_file(&mut self, task_id: usize, name: &str, size: u64) -> Result<()> {
        self.check_task(task_id)?;
        self.tasks[task_id].input_files.push(FileItem::input(name, size));
        Ok(())
    }

    pub fn add_output_file(&mut self, task_id: usize, name: &str, size: u64) -> Result<()> {
        self.check_task(task_id)?;
        self.tasks[task_id].output_files.push(FileItem::output(name, size));
        Ok(())
    }

    pub fn add_dependency(&mut self, parent: usize, child: usize) -> Result<()> {
        self.check_task(parent)?;
        self.check_task(child)?;
        if parent == child {
            return Err(Error::InvalidWorkflow(format!("task {} depends on itself", parent)));
        }
        self.tasks[parent].children.insert(child);
        self.tasks[child].parents.insert(parent);
        self.finalized = false;
        Ok(())
    }

    /// Adds an edge from every producer of a file to every task reading it.
    pub fn add_file_dependencies(&mut self) -> Result<()> {
        let mut edges = Vec::new();
        for producer in self.tasks.iter() {
            for output in producer.output_files.iter() {
                for consumer in self.tasks.iter() {
                    if consumer.id != producer.id && consumer.input_files.iter().any(|f| f.name == output.name) {
                        edges.push((producer.id, consumer.id));
                    }
                }
            }
        }
        for (parent, child) in edges {
            self.add_dependency(parent, child)?;
        }
        Ok(())
    }

    pub fn task(&self, task_id: usize) -> &Task {
        &self.tasks[task_id]
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn roots(&self) -> Vec<usize> {
        self.tasks.iter().filter(|t| t.is_root()).map(|t| t.id).collect()
    }

    pub fn topological_order(&self) -> Result<Vec<usize>> {
        let parents: Vec<BTreeSet<usize>> = self.tasks.iter().map(|t| t.parents.clone()).collect();
        topological_sort(&parents).map_err(|stuck| {
            Error::InvalidWorkflow(format!("dependency cycle through tasks {:?}", stuck))
        })
    }

    /// Validates the graph and computes task depths.
    pub fn finalize(&mut self) -> Result<()> {
        let order = self.topological_order()?;
        for task_id in order {
            let depth = self.tasks[task_id]
                .parents
                .iter()
                .map(|&p| self.tasks[p].depth + 1)
                .max()
                .unwrap_or(0);
            self.tasks[task_id].depth = depth;
        }
        self.finalized = true;
        Ok(())
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Task ids grouped by depth, in increasing id order within a level.
    pub fn levels(&self) -> Vec<Vec<usize>> {
        let max_depth = self.tasks.iter().map(|t| t.depth).max();
        let mut levels = vec![Vec::new(); max_depth.map_or(0, |d| d + 1)];
        for task in self.tasks.iter() {
            levels[task.depth].push(task.id);
        }
        levels
    }

    /// Files read by some task and produced by none of them.
    pub fn input_files(&self) -> Vec<FileItem> {
        let produced: BTreeSet<&str> = self
            .tasks
            .iter()
            .flat_map(|t| t.output_files.iter().map(|f| f.name.as_str()))
            .collect();
        let mut seen = BTreeSet::new();
        let mut files = Vec::new();
        for task in self.tasks.iter() {
            for file in task.input_files.iter() {
                if !produced.contains(file.name.as_str()) && seen.insert(file.name.clone()) {
                    files.push(file.clone());
                }
            }
        }
        files
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depths_follow_longest_path() {
        let mut wf = Workflow::new();
        let a = wf.add_task("a", 1.);
        let b = wf.add_task("b", 1.);
        let c = wf.add_task("c", 1.);
        let d = wf.add_task("d", 1.);
        wf.add_dependency(a, b).unwrap();
        wf.add_dependency(b, c).unwrap();
        wf.add_dependency(a, d).unwrap();
        wf.add_dependency(c, d).unwrap();
        wf.finalize().unwrap();
        let depths: Vec<usize> = wf.tasks().iter().map(|t| t.depth).collect();
        assert_eq!(depths, vec![0, 1, 2, 3]);
        assert_eq!(wf.levels(), vec![vec![a], vec![b], vec![c], vec![d]]);
        assert_eq!(wf.roots(), vec![a]);
    }

    #[test]
    fn cycles_and_bad_ids_are_rejected() {
        let mut wf = Workflow::new();
        let a = wf.add_task("a", 1.);
        let b = wf.add_task("b", 1.);
        assert!(matches!(wf.add_dependency(a, a), Err(Error::InvalidWorkflow(_))));
        assert!(matches!(wf.add_dependency(a, 5), Err(Error::InvalidWorkflow(_))));
        wf.add_dependency(a, b).unwrap();
        wf.add_dependency(b, a).unwrap();
        assert!(matches!(wf.finalize(), Err(Error::InvalidWorkflow(_))));
    }

    #[test]
    fn file_dependencies_and_inputs() {
        let mut wf = Workflow::new();
        let a = wf.add_task("a", 1.);
        let b = wf.add_task("b", 1.);
        wf.add_input_file(a, "raw", 10).unwrap();
        wf.add_output_file(a, "mid", 5).unwrap();
        wf.add_input_file(b, "mid", 5).unwrap();
        wf.add_input_file(b, "raw", 10).unwrap();
        wf.add_file_dependencies().unwrap();
        wf.finalize().unwrap();
        assert_eq!(wf.task(b).parents.iter().copied().collect::<Vec<_>>(), vec![a]);
        let inputs = wf.input_files();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].name, "raw");
    }
}
