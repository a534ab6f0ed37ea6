//! The scheduler's task table.

use super::ProjectGraph;
use crate::core::{BuildResult, BuildStatusChangedEvent, TaskFailure, TaskState};
use crate::executor::{BuildTask, TaskExecution, TaskId};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

/// Point-in-time view of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskProgress {
    /// Task id.
    pub task_id: TaskId,
    /// The project.
    pub project: String,
    /// Current state.
    pub state: TaskState,
}

/// All tasks of one run, indexed by graph node.
///
/// Every state change goes through this table. Methods return the event to
/// publish so callers can publish after the lock is released.
#[derive(Debug)]
pub(crate) struct TaskTable {
    build_set_id: Uuid,
    tasks: Mutex<Vec<BuildTask>>,
}

impl TaskTable {
    pub(crate) fn new(build_set_id: Uuid, graph: &ProjectGraph) -> Self {
        let tasks = (0..graph.len())
            .map(|node| BuildTask::new(node, graph.project(node).clone()))
            .collect();
        Self {
            build_set_id,
            tasks: Mutex::new(tasks),
        }
    }

    pub(crate) fn task_id(&self, node: usize) -> TaskId {
        self.tasks.lock()[node].id
    }

    pub(crate) fn state(&self, node: usize) -> TaskState {
        self.tasks.lock()[node].state
    }

    /// Moves a task to `next` if the transition is legal.
    pub(crate) fn transition(&self, node: usize, next: TaskState) -> Option<BuildStatusChangedEvent> {
        let mut tasks = self.tasks.lock();
        let task = &mut tasks[node];
        Self::apply(self.build_set_id, task, next)
    }

    /// Records the executor's result for a running task.
    pub(crate) fn finish(&self, node: usize, execution: TaskExecution) -> Option<(BuildStatusChangedEvent, BuildResult)> {
        let mut tasks = self.tasks.lock();
        let task = &mut tasks[node];
        let next = TaskState::from(execution.result.status);
        let event = Self::apply(self.build_set_id, task, next)?;
        task.assignment = execution.assignment;
        task.result = Some(execution.result.clone());
        Some((event, execution.result))
    }

    /// Skips a task that has not started. Returns `None` if it already has.
    pub(crate) fn skip(&self, node: usize, cause: TaskFailure) -> Option<(BuildStatusChangedEvent, BuildResult)> {
        let mut tasks = self.tasks.lock();
        let task = &mut tasks[node];
        if !matches!(task.state, TaskState::Pending | TaskState::Ready) {
            return None;
        }
        let event = Self::apply(self.build_set_id, task, TaskState::Skipped)?;
        let result = BuildResult::unsuccessful(task.id, task.name(), cause);
        task.result = Some(result.clone());
        Some((event, result))
    }

    /// Nodes not yet started.
    pub(crate) fn not_started(&self) -> Vec<usize> {
        self.tasks
            .lock()
            .iter()
            .filter(|t| matches!(t.state, TaskState::Pending | TaskState::Ready))
            .map(|t| t.node)
            .collect()
    }

    /// Returns true once every task is terminal.
    pub(crate) fn all_terminal(&self) -> bool {
        self.tasks.lock().iter().all(BuildTask::is_terminal)
    }

    pub(crate) fn progress(&self) -> Vec<TaskProgress> {
        self.tasks
            .lock()
            .iter()
            .map(|t| TaskProgress {
                task_id: t.id,
                project: t.name().to_string(),
                state: t.state,
            })
            .collect()
    }

    /// Results of terminal tasks, in node order.
    pub(crate) fn results(&self) -> Vec<BuildResult> {
        self.tasks.lock().iter().filter_map(|t| t.result.clone()).collect()
    }

    fn apply(build_set_id: Uuid, task: &mut BuildTask, next: TaskState) -> Option<BuildStatusChangedEvent> {
        let old = task.state;
        if !old.can_transition_to(next) {
            error!(task_id = %task.id, project = %task.name(), from = %old, to = %next, "Rejected illegal task transition");
            return None;
        }
        task.state = next;
        Some(BuildStatusChangedEvent::new(build_set_id, task.id, task.name(), old, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BuildType, Project, ProjectCatalog};

    fn table() -> TaskTable {
        let catalog = ProjectCatalog::from_projects([
            Project::new("app", BuildType::Npm).with_dependency("lib"),
            Project::new("lib", BuildType::Npm),
        ])
        .unwrap();
        let graph = ProjectGraph::closure(&catalog, &["app"]).unwrap();
        TaskTable::new(Uuid::new_v4(), &graph)
    }

    #[test]
    fn test_legal_transitions_emit_events() {
        let table = table();

        let event = table.transition(1, TaskState::Ready).unwrap();
        assert_eq!(event.old_status, TaskState::Pending);
        assert_eq!(event.new_status, TaskState::Ready);
        assert_eq!(event.build_configuration_id, "lib");
        assert!(table.transition(1, TaskState::Running).is_some());
        assert_eq!(table.state(1), TaskState::Running);
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let table = table();
        assert!(table.transition(0, TaskState::Success).is_none());
        assert_eq!(table.state(0), TaskState::Pending);
    }

    #[test]
    fn test_skip_only_unstarted() {
        let table = table();
        table.transition(1, TaskState::Ready);
        table.transition(1, TaskState::Running);

        assert!(table
            .skip(1, TaskFailure::Cancelled { reason: "stop".into() })
            .is_none());

        let (event, result) = table
            .skip(0, TaskFailure::DependencyFailed { dependency: "lib".into() })
            .unwrap();
        assert_eq!(event.new_status, TaskState::Skipped);
        assert_eq!(result.project, "app");
        assert_eq!(table.not_started(), Vec::<usize>::new());
        assert!(!table.all_terminal());
    }
}
