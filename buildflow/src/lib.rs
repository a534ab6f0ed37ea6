//! # Buildflow
//!
//! A dependency-aware build orchestration engine.
//!
//! Buildflow builds a set of projects that depend on one another:
//!
//! - **Dependency scheduling**: closure of the requested projects, cycle
//!   rejection, and concurrent dispatch as soon as dependencies succeed
//! - **Driver dispatch**: a registry of build drivers keyed by build type
//! - **Scoped resources**: a fresh environment and source/deploy repositories
//!   per build, torn down on every exit path
//! - **Status notification**: every task and build set transition fanned out
//!   to subscribers
//! - **Result persistence**: terminal results handed to a datastore
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use buildflow::prelude::*;
//!
//! let catalog = ProjectCatalog::from_projects([
//!     Project::new("core", BuildType::Java),
//!     Project::new("app", BuildType::Docker).with_dependency("core"),
//! ])?;
//!
//! let executor = BuildTaskExecutor::new(
//!     Arc::new(DriverRegistry::builder().register(maven).register(docker).build()),
//!     Arc::new(EnvironmentProvisioner::single(containers)),
//!     Arc::new(RepositoryProvisioner::new(repositories)),
//!     OrchestratorConfig::default().from_env()?,
//! );
//! let scheduler = DependencyScheduler::new(
//!     Arc::new(catalog),
//!     Arc::new(executor),
//!     Arc::new(StatusNotifier::new()),
//!     ResultSink::new(datastore),
//! );
//!
//! let report = scheduler.run(&["app"], RunOptions::new()).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod audit;
pub mod cancellation;
pub mod config;
pub mod coordinator;
pub mod core;
pub mod datastore;
pub mod drivers;
pub mod environment;
pub mod errors;
pub mod events;
pub mod executor;
pub mod observability;
pub mod repository;
pub mod scheduler;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::audit::{AuditLog, Revision};
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::OrchestratorConfig;
    pub use crate::coordinator::{BuildCoordinator, BuildInfo};
    pub use crate::core::{
        Artifact, BuildResult, BuildSetStatus, BuildSetStatusChangedEvent, BuildStatus,
        BuildStatusChangedEvent, BuildType, Project, ProjectCatalog, RequestContext, StatusEvent,
        TaskFailure, TaskState, User,
    };
    pub use crate::datastore::{Datastore, InMemoryDatastore, ResultSink};
    pub use crate::drivers::{BuildDriver, BuildJob, CompletionHandle, DriverOutcome, DriverRegistry};
    pub use crate::environment::{EnvironmentDriver, EnvironmentHandle, EnvironmentProvisioner, EnvironmentRecipe};
    pub use crate::errors::{BuildflowError, CycleDetectedError};
    pub use crate::events::{
        ChannelSubscriber, CollectingSubscriber, LoggingSubscriber, StatusNotifier, StatusSubscriber,
    };
    pub use crate::executor::{BuildTaskExecutor, TaskId};
    pub use crate::repository::{RepositoryHandle, RepositoryHandles, RepositoryManager, RepositoryProvisioner};
    pub use crate::scheduler::{DependencyScheduler, RunOptions, RunReport};
    pub use std::sync::Arc;
}
