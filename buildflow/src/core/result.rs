//! Build results, artifacts and failure causes.

use super::{BuildStatus, BuildType};
use crate::executor::TaskId;
use chrono::{DateTime, Utc};
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::time::Duration;

/// An artifact produced by a build. Opaque to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Repository coordinate of the artifact (e.g. `org.acme:lib:jar:1.0`).
    pub identifier: String,
    /// File name as deployed.
    pub filename: String,
    /// Size in bytes.
    pub size: u64,
    /// Hex encoded MD5 digest.
    pub md5: String,
    /// Hex encoded SHA-256 digest.
    pub sha256: String,
}

impl Artifact {
    /// Describes an artifact from its content, computing checksums.
    #[must_use]
    pub fn from_bytes(identifier: impl Into<String>, filename: impl Into<String>, content: &[u8]) -> Self {
        Self {
            identifier: identifier.into(),
            filename: filename.into(),
            size: content.len() as u64,
            md5: hex::encode(Md5::digest(content)),
            sha256: hex::encode(Sha256::digest(content)),
        }
    }
}

/// Why a task did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskFailure {
    /// No registered driver handles the project's build type.
    NoDriverAvailable {
        /// The unhandled build type.
        build_type: BuildType,
    },
    /// The execution environment could not be provisioned.
    Environment {
        /// Error detail.
        message: String,
    },
    /// Repositories could not be configured.
    Repository {
        /// Error detail.
        message: String,
    },
    /// The driver never signalled completion within the bound.
    DriverHung {
        /// The bound in milliseconds.
        timeout_ms: u64,
    },
    /// The driver reported a failed build or refused to start it.
    BuildFailed {
        /// Error detail.
        message: String,
    },
    /// A dependency did not succeed, so this task never ran.
    DependencyFailed {
        /// The dependency that failed or was skipped.
        dependency: String,
    },
    /// The run was cancelled.
    Cancelled {
        /// The cancellation reason.
        reason: String,
    },
}

impl TaskFailure {
    /// Creates a hung-driver cause from the elapsed bound.
    #[must_use]
    pub fn driver_hung(timeout: Duration) -> Self {
        Self::DriverHung {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// The status a task ends in with this cause.
    #[must_use]
    pub fn status(&self) -> BuildStatus {
        match self {
            Self::DependencyFailed { .. } | Self::Cancelled { .. } => BuildStatus::Skipped,
            _ => BuildStatus::Failed,
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDriverAvailable { build_type } => {
                write!(f, "no driver available for build type {build_type}")
            }
            Self::Environment { message } => write!(f, "environment error: {message}"),
            Self::Repository { message } => write!(f, "repository error: {message}"),
            Self::DriverHung { timeout_ms } => write!(f, "driver hung after {timeout_ms}ms"),
            Self::BuildFailed { message } => write!(f, "build failed: {message}"),
            Self::DependencyFailed { dependency } => write!(f, "dependency '{dependency}' did not succeed"),
            Self::Cancelled { reason } => write!(f, "cancelled: {reason}"),
        }
    }
}

/// The outcome of one build task. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    /// The task this result belongs to.
    pub task_id: TaskId,
    /// The project that was built.
    pub project: String,
    /// Terminal status.
    pub status: BuildStatus,
    /// Produced artifacts (empty unless successful).
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
    /// Cause when failed or skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<TaskFailure>,
    /// The driver that ran the build, if one was resolved.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_id: Option<String>,
    /// When execution started (absent for tasks that never ran).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// When the task reached its terminal state.
    pub finished_at: DateTime<Utc>,
}

impl BuildResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(
        task_id: TaskId,
        project: impl Into<String>,
        driver_id: impl Into<String>,
        artifacts: Vec<Artifact>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id,
            project: project.into(),
            status: BuildStatus::Success,
            artifacts,
            cause: None,
            driver_id: Some(driver_id.into()),
            started_at: Some(started_at),
            finished_at: Utc::now(),
        }
    }

    /// Creates a failed or skipped result; the status follows from the cause.
    #[must_use]
    pub fn unsuccessful(task_id: TaskId, project: impl Into<String>, cause: TaskFailure) -> Self {
        Self {
            task_id,
            project: project.into(),
            status: cause.status(),
            artifacts: Vec::new(),
            cause: Some(cause),
            driver_id: None,
            started_at: None,
            finished_at: Utc::now(),
        }
    }

    /// Records the driver and start time on an unsuccessful result.
    #[must_use]
    pub fn ran_on(mut self, driver_id: Option<&str>, started_at: DateTime<Utc>) -> Self {
        self.driver_id = driver_id.map(String::from);
        self.started_at = Some(started_at);
        self
    }

    /// Returns true if the build succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == BuildStatus::Success
    }

    /// Wall-clock duration of the build, when it ran.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.started_at.map(|start| self.finished_at - start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_checksums() {
        let artifact = Artifact::from_bytes("org.acme:lib:jar:1.0", "lib-1.0.jar", b"hello");

        assert_eq!(artifact.size, 5);
        assert_eq!(artifact.md5, "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(
            artifact.sha256,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_failure_status() {
        assert_eq!(
            TaskFailure::DependencyFailed { dependency: "a".into() }.status(),
            BuildStatus::Skipped
        );
        assert_eq!(
            TaskFailure::driver_hung(Duration::from_secs(1)).status(),
            BuildStatus::Failed
        );
        assert_eq!(
            TaskFailure::NoDriverAvailable { build_type: BuildType::Docker }.to_string(),
            "no driver available for build type DOCKER"
        );
    }

    #[test]
    fn test_unsuccessful_result() {
        let result = BuildResult::unsuccessful(
            TaskId::new(7),
            "app",
            TaskFailure::BuildFailed { message: "exit 1".into() },
        );

        assert_eq!(result.status, BuildStatus::Failed);
        assert!(!result.is_success());
        assert!(result.duration().is_none());
    }

    #[test]
    fn test_result_serialization() {
        let result = BuildResult::unsuccessful(
            TaskId::new(3),
            "svc",
            TaskFailure::Cancelled { reason: "user".into() },
        );
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["status"], "SKIPPED");
        assert_eq!(json["cause"]["kind"], "cancelled");
        assert_eq!(json["task_id"], 3);
    }
}
