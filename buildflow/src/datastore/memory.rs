//! In-memory datastore with an audit trail.

use super::Datastore;
use crate::audit::{AuditLog, Revision, BUILD_RECORD};
use crate::core::BuildResult;
use crate::errors::{AuditError, PersistenceError};
use crate::executor::TaskId;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
struct Inner {
    records: HashMap<TaskId, BuildResult>,
    revisions: Vec<Revision>,
}

/// Keeps build records in memory and records a revision for every write.
///
/// Storing a result for a task that already has one is rejected, since
/// results are immutable once terminal.
#[derive(Debug, Default)]
pub struct InMemoryDatastore {
    inner: RwLock<Inner>,
}

impl InMemoryDatastore {
    /// Creates an empty datastore.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored record for a task.
    #[must_use]
    pub fn get(&self, task_id: TaskId) -> Option<BuildResult> {
        self.inner.read().records.get(&task_id).cloned()
    }

    /// Stored records for a project, oldest first.
    #[must_use]
    pub fn records_for(&self, project: &str) -> Vec<BuildResult> {
        let inner = self.inner.read();
        let mut records: Vec<_> = inner
            .records
            .values()
            .filter(|r| r.project == project)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.task_id);
        records
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }
}

#[async_trait]
impl Datastore for InMemoryDatastore {
    async fn store_completed_build(&self, result: &BuildResult) -> Result<(), PersistenceError> {
        let snapshot = serde_json::to_value(result)
            .map_err(|e| PersistenceError::new(result.task_id.get(), "serialization", e.to_string()))?;

        let mut inner = self.inner.write();
        if inner.records.contains_key(&result.task_id) {
            return Err(PersistenceError::new(
                result.task_id.get(),
                "duplicate",
                format!("a record for {} already exists", result.task_id),
            ));
        }

        let id = inner.revisions.len() as u64 + 1;
        inner.revisions.push(Revision {
            id,
            entity_type: BUILD_RECORD.to_string(),
            entity_snapshot: snapshot,
            recorded_at: Utc::now(),
        });
        inner.records.insert(result.task_id, result.clone());
        Ok(())
    }
}

#[async_trait]
impl AuditLog for InMemoryDatastore {
    async fn revisions(&self, entity_type: &str) -> Result<Vec<Revision>, AuditError> {
        if entity_type != BUILD_RECORD {
            return Err(AuditError::new(entity_type, "entity type is not audited"));
        }
        Ok(self
            .inner
            .read()
            .revisions
            .iter()
            .filter(|r| r.entity_type == entity_type)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BuildStatus, TaskFailure};
    use pretty_assertions::assert_eq;

    fn failed(task: u64, project: &str) -> BuildResult {
        BuildResult::unsuccessful(
            TaskId::new(task),
            project,
            TaskFailure::BuildFailed {
                message: "exit code 1".into(),
            },
        )
    }

    #[tokio::test]
    async fn test_store_and_get() {
        let store = InMemoryDatastore::new();
        let result = failed(10, "lib");

        store.store_completed_build(&result).await.unwrap();

        assert_eq!(store.get(TaskId::new(10)), Some(result));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_rejected() {
        let store = InMemoryDatastore::new();
        store.store_completed_build(&failed(11, "lib")).await.unwrap();

        let err = store.store_completed_build(&failed(11, "lib")).await.unwrap_err();
        assert_eq!(err.kind, "duplicate");
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_revisions_in_order() {
        let store = InMemoryDatastore::new();
        store.store_completed_build(&failed(21, "a")).await.unwrap();
        store.store_completed_build(&failed(20, "b")).await.unwrap();

        let revisions = store.revisions(BUILD_RECORD).await.unwrap();
        let ids: Vec<u64> = revisions.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(revisions[0].entity_snapshot["project"], "a");
        assert_eq!(revisions[1].entity_snapshot["status"], serde_json::json!(BuildStatus::Failed));
    }

    #[tokio::test]
    async fn test_unknown_entity_type() {
        let store = InMemoryDatastore::new();
        let err = store.revisions("Project").await.unwrap_err();
        assert_eq!(err.entity_type, "Project");
    }

    #[tokio::test]
    async fn test_records_for_project() {
        let store = InMemoryDatastore::new();
        store.store_completed_build(&failed(31, "lib")).await.unwrap();
        store.store_completed_build(&failed(30, "lib")).await.unwrap();
        store.store_completed_build(&failed(32, "app")).await.unwrap();

        let tasks: Vec<u64> = store.records_for("lib").iter().map(|r| r.task_id.get()).collect();
        assert_eq!(tasks, vec![30, 31]);
    }
}
