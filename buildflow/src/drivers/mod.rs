//! Build drivers.
//!
//! This module provides:
//! - The driver SPI implemented by build technologies
//! - The startup-time driver registry
//! - Completion routing from drivers back to waiting tasks

mod completion;
mod driver;
mod registry;

pub use completion::{CompletionHandle, CompletionRegistry, DriverOutcome};
pub use driver::{BuildDriver, BuildJob};
pub use registry::{DriverRegistry, DriverRegistryBuilder};
