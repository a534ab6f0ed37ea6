//! Per-task source and deploy repositories.
//!
//! A task gets a source repository (dependencies imported for the build) and
//! a deploy repository (artifacts it produces). Content is discarded when the
//! task's configuration is cleaned up unless the handle was persisted first.

mod provisioner;

pub use provisioner::RepositoryProvisioner;

use crate::core::Project;
use crate::errors::RepositoryError;
use crate::executor::TaskId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

/// Role of a repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepositoryKind {
    /// Dependencies imported for the build.
    Source,
    /// Artifacts produced by the build.
    Deploy,
}

impl fmt::Display for RepositoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Deploy => write!(f, "deploy"),
        }
    }
}

/// A repository provisioned for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryHandle {
    /// Manager-assigned repository id.
    pub id: String,
    /// Source or deploy.
    pub kind: RepositoryKind,
    /// Where builds reach the repository.
    pub url: String,
    /// The owning task.
    pub task_id: TaskId,
}

/// The pair of repositories configured for a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryHandles {
    /// Source repository.
    pub source: RepositoryHandle,
    /// Deploy repository.
    pub deploy: RepositoryHandle,
}

/// SPI for repository managers.
#[async_trait]
pub trait RepositoryManager: Send + Sync + Debug {
    /// Creates the source and deploy repositories for a task.
    async fn configure_repositories(
        &self,
        project: &Project,
        task_id: TaskId,
    ) -> Result<RepositoryHandles, RepositoryError>;

    /// Commits a repository's content so it survives cleanup.
    async fn persist(&self, handle: &RepositoryHandle) -> Result<(), RepositoryError>;

    /// Removes everything configured for a task. Must be idempotent.
    async fn cleanup_repository_configuration(&self, task_id: TaskId) -> Result<(), RepositoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_serialize() {
        assert_eq!(serde_json::to_string(&RepositoryKind::Deploy).unwrap(), r#""deploy""#);
        assert_eq!(RepositoryKind::Source.to_string(), "source");
    }
}
