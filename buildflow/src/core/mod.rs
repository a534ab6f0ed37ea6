//! Core domain model types for buildflow.
//!
//! This module contains the fundamental types used throughout the engine:
//! - Build types, task states and build set statuses
//! - Projects and the project catalog
//! - Build results, artifacts and failure causes
//! - Status change events
//! - Request-scoped user identity

mod event;
mod identity;
mod project;
mod result;
mod status;

pub use event::{BuildSetStatusChangedEvent, BuildStatusChangedEvent, StatusEvent};
pub use identity::{RequestContext, User};
pub use project::{Project, ProjectCatalog};
pub use result::{Artifact, BuildResult, TaskFailure};
pub use status::{BuildSetStatus, BuildStatus, BuildType, TaskState};
