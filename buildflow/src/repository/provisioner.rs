//! Repository provisioner.

use super::{RepositoryHandle, RepositoryHandles, RepositoryManager};
use crate::core::Project;
use crate::errors::RepositoryError;
use crate::executor::TaskId;
use dashmap::DashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Configures and cleans up task repositories through a [`RepositoryManager`].
///
/// Cleanup is forwarded to the manager at most once per configured task, so
/// repeated calls are harmless.
#[derive(Debug)]
pub struct RepositoryProvisioner {
    manager: Arc<dyn RepositoryManager>,
    configured: DashSet<TaskId>,
}

impl RepositoryProvisioner {
    /// Creates a provisioner over a manager.
    #[must_use]
    pub fn new(manager: Arc<dyn RepositoryManager>) -> Self {
        Self {
            manager,
            configured: DashSet::new(),
        }
    }

    /// Configures repositories for a task.
    ///
    /// The task is tracked for cleanup even when configuration fails, since a
    /// manager may have created part of the configuration.
    ///
    /// # Errors
    ///
    /// Returns the manager's error.
    pub async fn configure(&self, project: &Project, task_id: TaskId) -> Result<RepositoryHandles, RepositoryError> {
        self.configured.insert(task_id);
        let handles = self.manager.configure_repositories(project, task_id).await?;
        info!(
            task_id = %task_id,
            project = %project.name,
            source = %handles.source.url,
            deploy = %handles.deploy.url,
            "Repositories configured"
        );
        Ok(handles)
    }

    /// Persists a repository's content.
    ///
    /// # Errors
    ///
    /// Returns the manager's error.
    pub async fn persist(&self, handle: &RepositoryHandle) -> Result<(), RepositoryError> {
        debug!(task_id = %handle.task_id, repository = %handle.id, kind = %handle.kind, "Persisting repository");
        self.manager.persist(handle).await
    }

    /// Removes a task's repository configuration. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns the manager's error.
    pub async fn cleanup(&self, task_id: TaskId) -> Result<(), RepositoryError> {
        if self.configured.remove(&task_id).is_none() {
            debug!(task_id = %task_id, "No repository configuration to clean up");
            return Ok(());
        }

        self.manager
            .cleanup_repository_configuration(task_id)
            .await
            .map_err(|e| {
                warn!(task_id = %task_id, error = %e, "Repository cleanup failed");
                e
            })
    }

    /// Number of tasks with configuration still awaiting cleanup.
    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.configured.len()
    }
}
