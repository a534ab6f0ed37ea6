//! Build task execution.
//!
//! This module provides:
//! - Task ids and the task record owned by the scheduler
//! - The executor that runs a single task through its driver
//! - LIFO teardown of task-scoped resources

#[allow(clippy::module_inception)]
mod executor;
mod task;
mod teardown;

pub use executor::{BuildTaskExecutor, TaskExecution};
pub use task::{BuildTask, TaskAssignment, TaskId};
pub use teardown::TeardownStack;
