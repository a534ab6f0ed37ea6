//! Build task bookkeeping.

use crate::core::{BuildResult, Project, TaskState};
use crate::environment::EnvironmentHandle;
use crate::repository::RepositoryHandles;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a build task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(u64);

impl TaskId {
    /// Wraps a raw id.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next free id.
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Resources and driver assigned to a task while it executed.
#[derive(Debug, Clone, Default)]
pub struct TaskAssignment {
    /// The resolved driver.
    pub driver_id: Option<String>,
    /// The provisioned environment.
    pub environment: Option<EnvironmentHandle>,
    /// The configured repositories.
    pub repositories: Option<RepositoryHandles>,
}

/// One scheduled execution of a project within a run.
///
/// Owned by the scheduler's task table; everything else refers to it by id.
#[derive(Debug, Clone)]
pub struct BuildTask {
    /// Task id.
    pub id: TaskId,
    /// Index of the project in the run's graph.
    pub node: usize,
    /// The project to build.
    pub project: Arc<Project>,
    /// Current state.
    pub state: TaskState,
    /// What the executor assigned to the task.
    pub assignment: TaskAssignment,
    /// The terminal result, once available.
    pub result: Option<BuildResult>,
}

impl BuildTask {
    /// Creates a pending task for a graph node.
    #[must_use]
    pub fn new(node: usize, project: Arc<Project>) -> Self {
        Self {
            id: TaskId::next(),
            node,
            project,
            state: TaskState::Pending,
            assignment: TaskAssignment::default(),
            result: None,
        }
    }

    /// The project name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.project.name
    }

    /// Returns true once the task reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
