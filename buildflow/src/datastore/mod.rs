//! Persistence of terminal build results.
//!
//! This module provides:
//! - The datastore SPI
//! - The result sink the scheduler hands terminal results to
//! - An in-memory datastore that also answers audit queries

mod memory;

pub use memory::InMemoryDatastore;

use crate::core::BuildResult;
use crate::errors::PersistenceError;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// SPI for storing completed builds.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Stores a terminal build result.
    async fn store_completed_build(&self, result: &BuildResult) -> Result<(), PersistenceError>;
}

/// Hands terminal build results to the datastore.
///
/// A failed write is logged and returned to the caller; it never changes the
/// result's status.
#[derive(Clone)]
pub struct ResultSink {
    datastore: Arc<dyn Datastore>,
}

impl fmt::Debug for ResultSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultSink").finish_non_exhaustive()
    }
}

impl ResultSink {
    /// Creates a sink over a datastore.
    #[must_use]
    pub fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self { datastore }
    }

    /// Stores a result.
    ///
    /// # Errors
    ///
    /// Returns the datastore's error.
    pub async fn store(&self, result: &BuildResult) -> Result<(), PersistenceError> {
        match self.datastore.store_completed_build(result).await {
            Ok(()) => {
                debug!(task_id = %result.task_id, project = %result.project, status = %result.status, "Build result stored");
                Ok(())
            }
            Err(e) => {
                warn!(task_id = %result.task_id, project = %result.project, error = %e, "Failed to store build result");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TaskFailure;
    use crate::executor::TaskId;

    #[tokio::test]
    async fn test_store_forwards_once() {
        let mut datastore = MockDatastore::new();
        datastore
            .expect_store_completed_build()
            .withf(|r| r.project == "lib")
            .times(1)
            .returning(|_| Ok(()));

        let sink = ResultSink::new(Arc::new(datastore));
        let result = BuildResult::success(TaskId::next(), "lib", "maven", Vec::new(), chrono::Utc::now());
        assert!(sink.store(&result).await.is_ok());
    }

    #[tokio::test]
    async fn test_store_error_is_returned() {
        let mut datastore = MockDatastore::new();
        datastore
            .expect_store_completed_build()
            .returning(|r| Err(PersistenceError::new(r.task_id.get(), "constraint", "duplicate key")));

        let sink = ResultSink::new(Arc::new(datastore));
        let result = BuildResult::unsuccessful(
            TaskId::next(),
            "app",
            TaskFailure::BuildFailed {
                message: "tests failed".into(),
            },
        );

        let err = sink.store(&result).await.unwrap_err();
        assert_eq!(err.kind, "constraint");
    }
}
