//! Dependency scheduling.
//!
//! This module provides:
//! - Closure and cycle checking of a build set's dependency graph
//! - Concurrent, dependency-ordered dispatch of build tasks
//! - Failure propagation to dependents and run cancellation
//! - The report of a finished run

mod graph;
mod report;
#[allow(clippy::module_inception)]
mod scheduler;
mod table;


pub use graph::ProjectGraph;
pub use report::RunReport;
pub use scheduler::{DependencyScheduler, RunHandle, RunOptions, RunProgress};
pub use table::TaskProgress;
