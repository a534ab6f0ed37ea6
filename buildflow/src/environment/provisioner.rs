//! Environment provisioner.

use super::{EnvironmentDriver, EnvironmentHandle, EnvironmentRecipe};
use crate::errors::EnvironmentError;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Creates and destroys task environments through registered drivers.
///
/// The driver list is fixed at construction. No retries are attempted;
/// a provisioning error is terminal for the task that asked.
#[derive(Debug, Default)]
pub struct EnvironmentProvisioner {
    drivers: Vec<Arc<dyn EnvironmentDriver>>,
}

impl EnvironmentProvisioner {
    /// Creates a provisioner over a set of drivers, tried in order.
    #[must_use]
    pub fn new(drivers: Vec<Arc<dyn EnvironmentDriver>>) -> Self {
        Self { drivers }
    }

    /// Creates a provisioner backed by a single driver.
    #[must_use]
    pub fn single(driver: Arc<dyn EnvironmentDriver>) -> Self {
        Self::new(vec![driver])
    }

    /// Provisions an environment for a recipe.
    ///
    /// # Errors
    ///
    /// Returns an error if no driver supports the build type or the backend fails.
    pub async fn provision(&self, recipe: &EnvironmentRecipe) -> Result<EnvironmentHandle, EnvironmentError> {
        let driver = self
            .drivers
            .iter()
            .find(|d| d.can_build(recipe.build_type))
            .ok_or_else(|| {
                EnvironmentError::new(format!(
                    "no environment driver supports build type {}",
                    recipe.build_type
                ))
            })?;

        debug!(project = %recipe.project, driver = %driver.driver_id(), "Provisioning environment");
        let handle = driver.build_environment(recipe).await?;
        info!(project = %recipe.project, environment = %handle.id, "Environment provisioned");
        Ok(handle)
    }

    /// Destroys an environment through the driver that created it.
    ///
    /// # Errors
    ///
    /// Returns an error if the owning driver is unknown or the backend fails.
    pub async fn teardown(&self, handle: &EnvironmentHandle) -> Result<(), EnvironmentError> {
        let driver = self
            .drivers
            .iter()
            .find(|d| d.driver_id() == handle.driver_id)
            .ok_or_else(|| {
                EnvironmentError::new(format!(
                    "environment {} was created by unknown driver '{}'",
                    handle.id, handle.driver_id
                ))
            })?;

        match driver.cleanup_environment(handle).await {
            Ok(()) => {
                debug!(environment = %handle.id, "Environment destroyed");
                Ok(())
            }
            Err(e) => {
                warn!(environment = %handle.id, error = %e, "Environment teardown failed");
                Err(e)
            }
        }
    }
}
