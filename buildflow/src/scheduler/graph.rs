//! Dependency graph of a build set.

use crate::core::{Project, ProjectCatalog};
use crate::errors::{BuildflowError, CycleDetectedError};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// The dependency closure of a set of root projects.
///
/// Nodes live in an arena indexed by discovery order: roots first, then
/// their dependencies breadth-first. Edges are node indices in both
/// directions.
#[derive(Debug, Clone)]
pub struct ProjectGraph {
    nodes: Vec<Arc<Project>>,
    index: HashMap<String, usize>,
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    roots: Vec<usize>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Grey,
    Black,
}

impl ProjectGraph {
    /// Expands root projects into their full dependency closure.
    ///
    /// # Errors
    ///
    /// Returns `UnknownProject` if a root or any transitive dependency is
    /// missing from the catalog.
    pub fn closure<S: AsRef<str>>(catalog: &ProjectCatalog, roots: &[S]) -> Result<Self, BuildflowError> {
        let mut nodes: Vec<Arc<Project>> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut queue: VecDeque<usize> = VecDeque::new();
        let mut root_nodes = Vec::new();

        for root in roots {
            let name = root.as_ref();
            if let Some(&existing) = index.get(name) {
                if !root_nodes.contains(&existing) {
                    root_nodes.push(existing);
                }
                continue;
            }
            let project = catalog
                .get(name)
                .ok_or_else(|| BuildflowError::unknown_project(name, None))?;
            let node = nodes.len();
            index.insert(name.to_string(), node);
            nodes.push(Arc::new(project.clone()));
            root_nodes.push(node);
            queue.push_back(node);
        }

        while let Some(node) = queue.pop_front() {
            let parent = nodes[node].clone();
            for dependency in &parent.dependencies {
                if index.contains_key(dependency) {
                    continue;
                }
                let project = catalog
                    .get(dependency)
                    .ok_or_else(|| BuildflowError::unknown_project(dependency, Some(&parent.name)))?;
                let child = nodes.len();
                index.insert(dependency.clone(), child);
                nodes.push(Arc::new(project.clone()));
                queue.push_back(child);
            }
        }

        let mut dependencies = vec![Vec::new(); nodes.len()];
        let mut dependents = vec![Vec::new(); nodes.len()];
        for (node, project) in nodes.iter().enumerate() {
            for dependency in &project.dependencies {
                let dep = index[dependency];
                dependencies[node].push(dep);
                dependents[dep].push(node);
            }
        }

        Ok(Self {
            nodes,
            index,
            dependencies,
            dependents,
            roots: root_nodes,
        })
    }

    /// Verifies the graph has no cycle.
    ///
    /// # Errors
    ///
    /// Returns the first cycle found, as a path of project names that starts
    /// and ends with the same project.
    pub fn check_acyclic(&self) -> Result<(), CycleDetectedError> {
        let mut marks = vec![Mark::White; self.nodes.len()];
        let mut path = Vec::new();

        for start in 0..self.nodes.len() {
            if marks[start] == Mark::White {
                if let Some(cycle) = self.visit(start, &mut marks, &mut path) {
                    let names = cycle.into_iter().map(|n| self.nodes[n].name.clone()).collect();
                    return Err(CycleDetectedError::new(names));
                }
            }
        }
        Ok(())
    }

    fn visit(&self, node: usize, marks: &mut [Mark], path: &mut Vec<usize>) -> Option<Vec<usize>> {
        marks[node] = Mark::Grey;
        path.push(node);

        for &dep in &self.dependencies[node] {
            match marks[dep] {
                Mark::Grey => {
                    let start = path.iter().position(|&n| n == dep).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(dep);
                    return Some(cycle);
                }
                Mark::White => {
                    if let Some(cycle) = self.visit(dep, marks, path) {
                        return Some(cycle);
                    }
                }
                Mark::Black => {}
            }
        }

        path.pop();
        marks[node] = Mark::Black;
        None
    }

    /// A dependency-respecting order of all nodes.
    ///
    /// Nodes whose dependencies are satisfied at the same time keep their
    /// discovery order. Only meaningful for an acyclic graph.
    #[must_use]
    pub fn topological_order(&self) -> Vec<usize> {
        let mut remaining: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut ready: VecDeque<usize> = (0..self.nodes.len()).filter(|&n| remaining[n] == 0).collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(node) = ready.pop_front() {
            order.push(node);
            for &dependent in &self.dependents[node] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    ready.push_back(dependent);
                }
            }
        }
        order
    }

    /// Every node that transitively depends on `node`, in breadth-first order.
    #[must_use]
    pub fn descendants(&self, node: usize) -> Vec<usize> {
        let mut seen = vec![false; self.nodes.len()];
        let mut queue: VecDeque<usize> = self.dependents[node].iter().copied().collect();
        let mut out = Vec::new();

        while let Some(next) = queue.pop_front() {
            if std::mem::replace(&mut seen[next], true) {
                continue;
            }
            out.push(next);
            queue.extend(self.dependents[next].iter().copied());
        }
        out
    }

    /// Number of projects in the closure.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the closure is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The project at a node.
    #[must_use]
    pub fn project(&self, node: usize) -> &Arc<Project> {
        &self.nodes[node]
    }

    /// Node index of a project.
    #[must_use]
    pub fn node_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Direct dependencies of a node.
    #[must_use]
    pub fn dependencies(&self, node: usize) -> &[usize] {
        &self.dependencies[node]
    }

    /// Direct dependents of a node.
    #[must_use]
    pub fn dependents(&self, node: usize) -> &[usize] {
        &self.dependents[node]
    }

    /// The root nodes.
    #[must_use]
    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    /// Project names in discovery order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.nodes.iter().map(|p| p.name.as_str()).collect()
    }
}
