//! Build type, task state and build set status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The build technology a project requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildType {
    /// Native toolchain build (make, cmake, ...).
    Native,
    /// Managed-language JVM build.
    Java,
    /// Container image build.
    Docker,
    /// JavaScript package build.
    Npm,
    /// Python package build.
    Python,
}

impl BuildType {
    /// All known build types.
    pub const ALL: [Self; 5] = [Self::Native, Self::Java, Self::Docker, Self::Npm, Self::Python];
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native => write!(f, "NATIVE"),
            Self::Java => write!(f, "JAVA"),
            Self::Docker => write!(f, "DOCKER"),
            Self::Npm => write!(f, "NPM"),
            Self::Python => write!(f, "PYTHON"),
        }
    }
}

/// State of a single build task within a run.
///
/// `Pending -> Ready -> Running -> {Success | Failed | Skipped}`, and
/// `Pending -> Skipped` when a dependency did not succeed. Active tasks only
/// reach `Skipped` through run cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    /// Waiting for dependencies.
    #[default]
    Pending,
    /// All dependencies succeeded; queued for dispatch.
    Ready,
    /// Handed to the executor.
    Running,
    /// The build succeeded.
    Success,
    /// The build failed.
    Failed,
    /// The build never ran (or was cancelled).
    Skipped,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Ready => write!(f, "READY"),
            Self::Running => write!(f, "RUNNING"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
            Self::Skipped => write!(f, "SKIPPED"),
        }
    }
}

impl TaskState {
    /// Returns true if no further transition can occur.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed | Self::Skipped)
    }

    /// Returns true if the scheduler may move a task from `self` to `next`.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Ready | Self::Skipped)
                | (Self::Ready, Self::Running | Self::Skipped)
                | (Self::Running, Self::Success | Self::Failed | Self::Skipped)
        )
    }
}

/// Terminal outcome recorded in a build result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    /// The build succeeded.
    Success,
    /// The build failed.
    Failed,
    /// The build was skipped.
    Skipped,
}

impl From<BuildStatus> for TaskState {
    fn from(status: BuildStatus) -> Self {
        match status {
            BuildStatus::Success => Self::Success,
            BuildStatus::Failed => Self::Failed,
            BuildStatus::Skipped => Self::Skipped,
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        TaskState::from(*self).fmt(f)
    }
}

/// Status of a whole build set (one orchestration run).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildSetStatus {
    /// Accepted, not yet started.
    #[default]
    New,
    /// Tasks are executing.
    Building,
    /// Every task succeeded.
    Success,
    /// At least one task failed or was skipped.
    Failed,
    /// The run was cancelled.
    Cancelled,
    /// Refused before execution (cycle, unknown project).
    Rejected,
}

impl BuildSetStatus {
    /// Returns true if the build set has finished.
    #[must_use]
    pub fn is_final(&self) -> bool {
        !matches!(self, Self::New | Self::Building)
    }
}

impl fmt::Display for BuildSetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::New => write!(f, "NEW"),
            Self::Building => write!(f, "BUILDING"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Failed => write!(f, "FAILED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Rejected => write!(f, "REJECTED"),
        }
    }
}
