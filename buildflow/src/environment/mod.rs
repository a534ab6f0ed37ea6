//! Per-task execution environments.
//!
//! This module provides:
//! - The environment driver SPI implemented by backends (container hosts, VMs)
//! - Environment recipes and handles
//! - The provisioner that picks a capable driver and tears handles down

mod provisioner;

pub use provisioner::EnvironmentProvisioner;

use crate::core::{BuildType, Project};
use crate::errors::EnvironmentError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;

/// What a task needs from its execution environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentRecipe {
    /// The project the environment is for.
    pub project: String,
    /// The build technology the environment must support.
    pub build_type: BuildType,
    /// A specific image, if the project requests one.
    pub image: Option<String>,
}

impl EnvironmentRecipe {
    /// Derives the recipe for a project.
    #[must_use]
    pub fn for_project(project: &Project) -> Self {
        Self {
            project: project.name.clone(),
            build_type: project.build_type,
            image: project.environment_image.clone(),
        }
    }
}

/// A provisioned environment, exclusively owned by one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentHandle {
    /// Backend-assigned environment id.
    pub id: String,
    /// The environment driver that created it.
    pub driver_id: String,
    /// Backend details (host, ports, image digest, ...).
    #[serde(default)]
    pub details: HashMap<String, String>,
}

impl EnvironmentHandle {
    /// Creates a handle.
    #[must_use]
    pub fn new(id: impl Into<String>, driver_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            driver_id: driver_id.into(),
            details: HashMap::new(),
        }
    }

    /// Adds a backend detail.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// SPI for environment backends.
#[async_trait]
pub trait EnvironmentDriver: Send + Sync + Debug {
    /// Identifier of this environment driver.
    fn driver_id(&self) -> &str;

    /// Returns true if the driver can host builds of this type.
    fn can_build(&self, build_type: BuildType) -> bool;

    /// Provisions an environment for the recipe.
    async fn build_environment(&self, recipe: &EnvironmentRecipe) -> Result<EnvironmentHandle, EnvironmentError>;

    /// Destroys an environment.
    async fn cleanup_environment(&self, handle: &EnvironmentHandle) -> Result<(), EnvironmentError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipe_for_project() {
        let project = Project::new("svc", BuildType::Docker).with_environment_image("builder:1.2");
        let recipe = EnvironmentRecipe::for_project(&project);

        assert_eq!(recipe.project, "svc");
        assert_eq!(recipe.build_type, BuildType::Docker);
        assert_eq!(recipe.image.as_deref(), Some("builder:1.2"));
    }

    #[test]
    fn test_handle_details() {
        let handle = EnvironmentHandle::new("env-1", "local").with_detail("host", "10.0.0.5");
        assert_eq!(handle.details.get("host").map(String::as_str), Some("10.0.0.5"));
    }
}
