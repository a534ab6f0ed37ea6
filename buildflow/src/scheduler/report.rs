//! Outcome of a scheduler run.

use crate::core::{BuildResult, BuildSetStatus, BuildStatus};
use crate::errors::PersistenceError;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Everything a run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    /// The build set id.
    pub build_set_id: Uuid,
    /// Aggregate status.
    pub status: BuildSetStatus,
    /// One result per task, in closure order.
    pub results: Vec<BuildResult>,
    /// Projects in the order they were dispatched to the executor.
    pub execution_order: Vec<String>,
    /// Results the datastore failed to store.
    pub persistence_errors: Vec<PersistenceError>,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the last task reached a terminal state.
    pub ended_at: DateTime<Utc>,
}

impl RunReport {
    /// Returns true if every task succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == BuildSetStatus::Success
    }

    /// The result for a project.
    #[must_use]
    pub fn result_for(&self, project: &str) -> Option<&BuildResult> {
        self.results.iter().find(|r| r.project == project)
    }

    /// The status of a project's task.
    #[must_use]
    pub fn status_of(&self, project: &str) -> Option<BuildStatus> {
        self.result_for(project).map(|r| r.status)
    }

    /// Number of tasks that ended with `status`.
    #[must_use]
    pub fn count(&self, status: BuildStatus) -> usize {
        self.results.iter().filter(|r| r.status == status).count()
    }

    /// Position of a project in the dispatch order.
    #[must_use]
    pub fn dispatch_position(&self, project: &str) -> Option<usize> {
        self.execution_order.iter().position(|p| p == project)
    }

    /// Wall-clock duration of the run.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.ended_at - self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TaskFailure;
    use crate::executor::TaskId;

    #[test]
    fn test_report_queries() {
        let now = Utc::now();
        let report = RunReport {
            build_set_id: Uuid::new_v4(),
            status: BuildSetStatus::Failed,
            results: vec![
                BuildResult::unsuccessful(TaskId::new(1), "lib", TaskFailure::BuildFailed { message: "x".into() }),
                BuildResult::unsuccessful(
                    TaskId::new(2),
                    "app",
                    TaskFailure::DependencyFailed {
                        dependency: "lib".into(),
                    },
                ),
            ],
            execution_order: vec!["lib".into()],
            persistence_errors: Vec::new(),
            started_at: now,
            ended_at: now,
        };

        assert!(!report.is_success());
        assert_eq!(report.status_of("app"), Some(BuildStatus::Skipped));
        assert_eq!(report.count(BuildStatus::Failed), 1);
        assert_eq!(report.dispatch_position("app"), None);
        assert_eq!(report.duration(), chrono::Duration::zero());
    }
}
