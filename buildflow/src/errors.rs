//! Error types for the buildflow orchestration engine.
//!
//! Errors are split by scope. Run-scoped errors ([`CycleDetectedError`],
//! unknown projects) abort a run before anything is provisioned. Task-scoped
//! errors ([`EnvironmentError`], [`RepositoryError`], [`DriverError`], missing
//! drivers, hung drivers) end a single task and skip its descendants.
//! [`PersistenceError`] is reported after the outcome is decided and never
//! changes it.

use crate::core::BuildType;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// The main error type for buildflow operations.
#[derive(Debug, Error)]
pub enum BuildflowError {
    /// The dependency graph of a build set contains a cycle.
    #[error("{0}")]
    CyclicDependency(#[from] CycleDetectedError),

    /// A root or dependency references a project that is not in the catalog.
    #[error("Unknown project '{name}'{}", .referenced_by.as_ref().map(|r| format!(" (required by '{r}')")).unwrap_or_default())]
    UnknownProject {
        /// The missing project name.
        name: String,
        /// The project whose dependency list names it, if any.
        referenced_by: Option<String>,
    },

    /// A project definition is invalid.
    #[error("Invalid project '{name}': {reason}")]
    InvalidProject {
        /// The project name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// No registered driver can build the requested type.
    #[error("No driver available for build type {build_type}")]
    NoDriverAvailable {
        /// The requested build type.
        build_type: BuildType,
    },

    /// Environment provisioning or teardown failed.
    #[error("{0}")]
    Environment(#[from] EnvironmentError),

    /// Repository configuration failed.
    #[error("{0}")]
    Repository(#[from] RepositoryError),

    /// A driver rejected a build request.
    #[error("{0}")]
    Driver(#[from] DriverError),

    /// A driver never signalled completion.
    #[error("Driver hung: no completion after {}ms", .timeout.as_millis())]
    DriverHung {
        /// The bound that elapsed.
        timeout: Duration,
    },

    /// Storing a completed build failed.
    #[error("{0}")]
    Persistence(#[from] PersistenceError),

    /// No build set with this id is known to the coordinator.
    #[error("Unknown build set: {0}")]
    UnknownBuildSet(Uuid),

    /// The build set has not finished yet.
    #[error("Build set {0} is still running")]
    BuildSetRunning(Uuid),

    /// The run was cancelled.
    #[error("Build cancelled: {0}")]
    Cancelled(String),

    /// Configuration could not be loaded or is invalid.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl BuildflowError {
    /// Creates an unknown project error.
    #[must_use]
    pub fn unknown_project(name: impl Into<String>, referenced_by: Option<&str>) -> Self {
        Self::UnknownProject {
            name: name.into(),
            referenced_by: referenced_by.map(String::from),
        }
    }

    /// Returns true if the error aborts the whole run before execution.
    #[must_use]
    pub fn is_run_scoped(&self) -> bool {
        matches!(
            self,
            Self::CyclicDependency(_) | Self::UnknownProject { .. } | Self::InvalidProject { .. }
        )
    }
}

/// Error raised when the dependency closure of a build set contains a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Cyclic dependency between projects: {}", .cycle_path.join(" -> "))]
pub struct CycleDetectedError {
    /// The projects forming the cycle; the first entry is repeated at the end.
    pub cycle_path: Vec<String>,
}

impl CycleDetectedError {
    /// Creates a new cycle error.
    #[must_use]
    pub fn new(cycle_path: Vec<String>) -> Self {
        Self { cycle_path }
    }

    /// The dependency edge that closes the cycle, as `(dependent, dependency)`.
    #[must_use]
    pub fn closing_edge(&self) -> Option<(&str, &str)> {
        match self.cycle_path.as_slice() {
            [.., dependent, dependency] => Some((dependent.as_str(), dependency.as_str())),
            _ => None,
        }
    }

    /// A hint naming one dependency to remove.
    #[must_use]
    pub fn fix_hint(&self) -> String {
        match self.closing_edge() {
            Some((dependent, dependency)) => {
                format!("remove the dependency of '{dependent}' on '{dependency}'")
            }
            None => "remove one of the dependencies in the cycle".to_string(),
        }
    }
}

/// Error raised by an environment driver.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Environment error: {message}")]
pub struct EnvironmentError {
    /// What went wrong.
    pub message: String,
    /// Whether the caller may reasonably retry.
    pub retryable: bool,
}

impl EnvironmentError {
    /// Creates a non-retryable environment error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a retryable environment error (backend unreachable, quota).
    #[must_use]
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }
}

/// Error raised by a repository manager.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Repository error: {message}")]
pub struct RepositoryError {
    /// What went wrong.
    pub message: String,
}

impl RepositoryError {
    /// Creates a new repository error.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Error raised by a build driver when it cannot start a build.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Driver '{driver_id}' failed: {message}")]
pub struct DriverError {
    /// The driver that failed.
    pub driver_id: String,
    /// What went wrong.
    pub message: String,
}

impl DriverError {
    /// Creates a new driver error.
    #[must_use]
    pub fn new(driver_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            driver_id: driver_id.into(),
            message: message.into(),
        }
    }
}

/// Error raised by the datastore when storing a build result.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Persistence error for task {task_id}: {message}")]
pub struct PersistenceError {
    /// The task whose result failed to store.
    pub task_id: u64,
    /// Datastore-specific error kind.
    pub kind: String,
    /// What went wrong.
    pub message: String,
}

impl PersistenceError {
    /// Creates a new persistence error.
    #[must_use]
    pub fn new(task_id: u64, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            task_id,
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Error raised by an audit log query.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Audit query failed for '{entity_type}': {message}")]
pub struct AuditError {
    /// The queried entity type.
    pub entity_type: String,
    /// What went wrong.
    pub message: String,
}

impl AuditError {
    /// Creates a new audit error.
    #[must_use]
    pub fn new(entity_type: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            message: message.into(),
        }
    }
}

/// Error returned by a status subscriber on delivery.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Subscriber error: {0}")]
pub struct SubscriberError(pub String);

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration document could not be parsed.
    #[error("Invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// An environment override was not a valid value.
    #[error("Invalid value '{value}' for {key}")]
    InvalidEnv {
        /// The environment variable.
        key: String,
        /// The rejected value.
        value: String,
    },

    /// A field failed validation.
    #[error("Invalid configuration field '{field}': {reason}")]
    Invalid {
        /// The offending field.
        field: &'static str,
        /// Why it was rejected.
        reason: String,
    },
}

/// Result alias for buildflow operations.
pub type Result<T> = std::result::Result<T, BuildflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_detected_error() {
        let err = CycleDetectedError::new(vec![
            "a".to_string(),
            "b".to_string(),
            "c".to_string(),
            "a".to_string(),
        ]);

        assert!(err.to_string().contains("a -> b -> c -> a"));
        assert_eq!(err.closing_edge(), Some(("c", "a")));
        assert_eq!(err.fix_hint(), "remove the dependency of 'c' on 'a'");
        assert_eq!(CycleDetectedError::new(Vec::new()).closing_edge(), None);
    }

    #[test]
    fn test_unknown_project_message() {
        let err = BuildflowError::unknown_project("lib", Some("app"));
        assert_eq!(err.to_string(), "Unknown project 'lib' (required by 'app')");

        let err = BuildflowError::unknown_project("lib", None);
        assert_eq!(err.to_string(), "Unknown project 'lib'");
    }

    #[test]
    fn test_run_scoped_classification() {
        let cycle: BuildflowError = CycleDetectedError::new(vec!["a".into(), "a".into()]).into();
        assert!(cycle.is_run_scoped());

        let missing = BuildflowError::NoDriverAvailable {
            build_type: BuildType::Docker,
        };
        assert!(!missing.is_run_scoped());
        assert_eq!(missing.to_string(), "No driver available for build type DOCKER");
    }

    #[test]
    fn test_driver_hung_message() {
        let err = BuildflowError::DriverHung {
            timeout: Duration::from_millis(250),
        };
        assert_eq!(err.to_string(), "Driver hung: no completion after 250ms");
    }

    #[test]
    fn test_environment_error_retryable() {
        assert!(EnvironmentError::retryable("quota exceeded").retryable);
        assert!(!EnvironmentError::new("bad image").retryable);
    }
}
