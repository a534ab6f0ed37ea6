//! Driver registry.

use super::BuildDriver;
use crate::core::BuildType;
use crate::errors::BuildflowError;
use std::sync::Arc;
use tracing::debug;

/// The set of build drivers available to the engine.
///
/// Built once at startup and read-only afterwards, so lookups need no lock.
#[derive(Debug, Default, Clone)]
pub struct DriverRegistry {
    drivers: Vec<Arc<dyn BuildDriver>>,
}

impl DriverRegistry {
    /// Starts building a registry.
    #[must_use]
    pub fn builder() -> DriverRegistryBuilder {
        DriverRegistryBuilder::default()
    }

    /// Resolves the driver for a build type.
    ///
    /// Drivers are scanned in registration order and the first one whose
    /// capabilities include `build_type` wins.
    ///
    /// # Errors
    ///
    /// Returns `NoDriverAvailable` if no registered driver can build the type.
    pub fn resolve(&self, build_type: BuildType) -> Result<Arc<dyn BuildDriver>, BuildflowError> {
        let driver = self
            .drivers
            .iter()
            .find(|d| d.can_build(build_type))
            .cloned()
            .ok_or(BuildflowError::NoDriverAvailable { build_type })?;

        debug!(build_type = %build_type, driver = %driver.driver_id(), "Resolved build driver");
        Ok(driver)
    }

    /// Returns true if some driver can build the type.
    #[must_use]
    pub fn supports(&self, build_type: BuildType) -> bool {
        self.drivers.iter().any(|d| d.can_build(build_type))
    }

    /// Registered driver ids, in registration order.
    #[must_use]
    pub fn driver_ids(&self) -> Vec<String> {
        self.drivers.iter().map(|d| d.driver_id().to_string()).collect()
    }

    /// Number of registered drivers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    /// Returns true if no drivers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }
}

/// Builder for [`DriverRegistry`].
#[derive(Debug, Default)]
pub struct DriverRegistryBuilder {
    drivers: Vec<Arc<dyn BuildDriver>>,
}

impl DriverRegistryBuilder {
    /// Registers a driver.
    #[must_use]
    pub fn register(mut self, driver: Arc<dyn BuildDriver>) -> Self {
        self.drivers.push(driver);
        self
    }

    /// Finishes the registry.
    #[must_use]
    pub fn build(self) -> DriverRegistry {
        DriverRegistry { drivers: self.drivers }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedDriver;

    #[test]
    fn test_resolve_first_match_wins() {
        let registry = DriverRegistry::builder()
            .register(Arc::new(ScriptedDriver::new("maven", BuildType::Java)))
            .register(Arc::new(ScriptedDriver::new("gradle", BuildType::Java)))
            .build();

        let driver = registry.resolve(BuildType::Java).unwrap();
        assert_eq!(driver.driver_id(), "maven");
    }

    #[test]
    fn test_resolve_missing_type() {
        let registry = DriverRegistry::builder()
            .register(Arc::new(ScriptedDriver::new("maven", BuildType::Java)))
            .build();

        let err = registry.resolve(BuildType::Docker).unwrap_err();
        assert!(matches!(
            err,
            BuildflowError::NoDriverAvailable {
                build_type: BuildType::Docker
            }
        ));
    }

    #[test]
    fn test_empty_registry_never_resolves() {
        let registry = DriverRegistry::default();
        assert!(registry.is_empty());

        for build_type in BuildType::ALL {
            assert!(registry.resolve(build_type).is_err());
            assert!(!registry.supports(build_type));
        }
    }

    #[test]
    fn test_multi_type_driver() {
        let registry = DriverRegistry::builder()
            .register(Arc::new(
                ScriptedDriver::new("polyglot", BuildType::Npm).also_building(BuildType::Python),
            ))
            .build();

        assert!(registry.supports(BuildType::Python));
        assert_eq!(registry.driver_ids(), vec!["polyglot".to_string()]);
    }
}
