//! Common utilities and types shared by the netcheck runner and probe.

#![warn(clippy::pedantic)]

/// Module for process exit codes and their normalization
pub mod exit_code;

/// Module for the probe command-line contract
pub mod probe_flags;

/// Module for common data types
pub mod types;
