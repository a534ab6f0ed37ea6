//! Orchestrator configuration.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable overriding the per-task driver timeout.
pub const ENV_TASK_TIMEOUT_MS: &str = "BUILDFLOW_TASK_TIMEOUT_MS";
/// Environment variable overriding the per-step teardown timeout.
pub const ENV_TEARDOWN_TIMEOUT_MS: &str = "BUILDFLOW_TEARDOWN_TIMEOUT_MS";

/// Tunables of the orchestration engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// How long a running build may go without a completion callback before
    /// it is failed as hung.
    pub task_timeout_ms: u64,
    /// Bound for each environment/repository teardown step.
    pub teardown_timeout_ms: u64,
    /// Persist source and deploy repositories of successful builds.
    pub persist_on_success: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            task_timeout_ms: 2 * 60 * 60 * 1000,
            teardown_timeout_ms: 60_000,
            persist_on_success: true,
        }
    }
}

impl OrchestratorConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the task timeout.
    #[must_use]
    pub fn with_task_timeout(mut self, timeout: Duration) -> Self {
        self.task_timeout_ms = duration_ms(timeout);
        self
    }

    /// Sets the teardown step timeout.
    #[must_use]
    pub fn with_teardown_timeout(mut self, timeout: Duration) -> Self {
        self.teardown_timeout_ms = duration_ms(timeout);
        self
    }

    /// Enables or disables persisting repositories of successful builds.
    #[must_use]
    pub fn with_persist_on_success(mut self, persist: bool) -> Self {
        self.persist_on_success = persist;
        self
    }

    /// The task timeout as a duration.
    #[must_use]
    pub fn task_timeout(&self) -> Duration {
        Duration::from_millis(self.task_timeout_ms)
    }

    /// The teardown step timeout as a duration.
    #[must_use]
    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }

    /// Parses a JSON document; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the document is malformed or fails validation.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies overrides from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if an override is not a valid value.
    pub fn from_env(self) -> Result<Self, ConfigError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from a lookup function.
    ///
    /// # Errors
    ///
    /// Returns an error if an override is not a valid value.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_TASK_TIMEOUT_MS) {
            self.task_timeout_ms = parse_ms(ENV_TASK_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_TEARDOWN_TIMEOUT_MS) {
            self.teardown_timeout_ms = parse_ms(ENV_TEARDOWN_TIMEOUT_MS, &value)?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if a timeout is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.task_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "task_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.teardown_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "teardown_timeout_ms",
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn parse_ms(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
        key: key.to_string(),
        value: value.to_string(),
    })
}
