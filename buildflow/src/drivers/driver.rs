//! Build driver SPI.

use super::CompletionHandle;
use crate::core::{BuildType, Project};
use crate::environment::EnvironmentHandle;
use crate::errors::DriverError;
use crate::executor::TaskId;
use crate::repository::RepositoryHandle;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Everything a driver needs to run one build.
///
/// Driver instances are shared across concurrent tasks, so per-build state
/// (repositories, environment) travels with the job instead of being set on
/// the driver.
#[derive(Debug, Clone)]
pub struct BuildJob {
    /// The task being executed.
    pub task_id: TaskId,
    /// The project to build.
    pub project: Arc<Project>,
    /// The environment to build in.
    pub environment: EnvironmentHandle,
    /// Repository dependencies are resolved from.
    pub source_repository: RepositoryHandle,
    /// Repository produced artifacts are deployed to.
    pub deploy_repository: RepositoryHandle,
}

/// A pluggable component that executes builds of one technology.
#[async_trait]
pub trait BuildDriver: Send + Sync + Debug {
    /// Unique identifier of the driver.
    fn driver_id(&self) -> &str;

    /// The build type the driver was written for.
    fn build_type(&self) -> BuildType;

    /// Returns true if the driver can build projects of this type.
    fn can_build(&self, build_type: BuildType) -> bool {
        build_type == self.build_type()
    }

    /// Starts a build.
    ///
    /// Returning `Ok` means the build was accepted; its outcome must later be
    /// reported through `completion`. Returning an error means the build never
    /// started and `completion` will not be used.
    async fn start_build(&self, job: BuildJob, completion: CompletionHandle) -> Result<(), DriverError>;
}
