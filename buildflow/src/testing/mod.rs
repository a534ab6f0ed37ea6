//! Testing utilities for buildflow.
//!
//! This module provides:
//! - Scripted build drivers (succeeding, failing, hanging, refusing)
//! - Recording environment and repository backends
//! - A datastore that rejects every write
//! - A fully wired test engine and the sample project graph

mod fixtures;
mod mocks;

pub use fixtures::{sample_projects, universal_driver, TestEngine, TestEngineBuilder};
pub use mocks::{
    DriverBehavior, FailingDatastore, RecordingEnvironmentDriver, RecordingRepositoryManager, ScriptedDriver,
};
