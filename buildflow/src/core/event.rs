//! Status change events emitted on every task and build set transition.

use super::{BuildSetStatus, TaskState};
use crate::executor::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single task changed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildStatusChangedEvent {
    /// State before the transition.
    pub old_status: TaskState,
    /// State after the transition.
    pub new_status: TaskState,
    /// The project (build configuration) being built.
    pub build_configuration_id: String,
    /// The task that changed.
    pub task_id: TaskId,
    /// The run the task belongs to.
    pub build_set_id: Uuid,
    /// When the transition happened.
    pub timestamp: DateTime<Utc>,
}

impl BuildStatusChangedEvent {
    /// Creates a new task transition event stamped now.
    #[must_use]
    pub fn new(
        build_set_id: Uuid,
        task_id: TaskId,
        build_configuration_id: impl Into<String>,
        old_status: TaskState,
        new_status: TaskState,
    ) -> Self {
        Self {
            old_status,
            new_status,
            build_configuration_id: build_configuration_id.into(),
            task_id,
            build_set_id,
            timestamp: Utc::now(),
        }
    }
}

/// A build set changed status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSetStatusChangedEvent {
    /// Status before the transition.
    pub old_status: BuildSetStatus,
    /// Status after the transition.
    pub new_status: BuildSetStatus,
    /// Aggregate task state before the transition, when tasks exist.
    pub old_build_status: Option<TaskState>,
    /// Aggregate task state after the transition, when tasks exist.
    pub new_build_status: Option<TaskState>,
    /// The build set.
    pub build_set_task_id: Uuid,
    /// The user that requested the build.
    pub user_id: Option<Uuid>,
    /// When the build set started.
    pub start_time: DateTime<Utc>,
    /// When the build set ended, once final.
    pub end_time: Option<DateTime<Utc>>,
    /// Human readable summary.
    pub description: String,
}

/// Any event published through the status notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    /// A task transition.
    Build(BuildStatusChangedEvent),
    /// A build set transition.
    BuildSet(BuildSetStatusChangedEvent),
}

impl StatusEvent {
    /// A dotted event name for logging (`build.running`, `build_set.success`).
    #[must_use]
    pub fn event_type(&self) -> String {
        match self {
            Self::Build(e) => format!("build.{}", e.new_status.to_string().to_lowercase()),
            Self::BuildSet(e) => format!("build_set.{}", e.new_status.to_string().to_lowercase()),
        }
    }

    /// The build set the event belongs to.
    #[must_use]
    pub fn build_set_id(&self) -> Uuid {
        match self {
            Self::Build(e) => e.build_set_id,
            Self::BuildSet(e) => e.build_set_task_id,
        }
    }
}

impl From<BuildStatusChangedEvent> for StatusEvent {
    fn from(event: BuildStatusChangedEvent) -> Self {
        Self::Build(event)
    }
}

impl From<BuildSetStatusChangedEvent> for StatusEvent {
    fn from(event: BuildSetStatusChangedEvent) -> Self {
        Self::BuildSet(event)
    }
}
