//! # lxlab-common
//!
//! Shared utilities and types for the lxlab provisioning tools.
//!
//! This crate provides common functionality used across all lxlab crates:
//! - Container directory layout
//! - External command execution
//! - Common error types

#![warn(missing_docs)]

pub mod error;
pub mod exec;
pub mod paths;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{LabError, LabResult};
pub use exec::{CommandExecutor, CommandOutput, CommandSpec, DryRunExecutor, SystemExecutor};
pub use paths::LabPaths;
