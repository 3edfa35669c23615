//! Netcheck probe library.
//!
//! A probe performs exactly one network check and reports the outcome as a
//! process exit code. The runner injects the probe binary into target pods as
//! an ephemeral container and reads that exit code back from the pod status.
//!
//! # Modules
//!
//! - `cli` - Command-line flags and their validation
//! - `errors` - Probe failure kinds and their exit codes
//! - `probe` - The `Probe` trait and probe construction
//! - `tcp` - TCP dial probe
//! - `dns` - DNS lookup probe
//! - `http` - HTTP request probe

pub mod cli;
pub mod dns;
pub mod errors;
pub mod http;
pub mod probe;
pub mod tcp;

pub use cli::Args;
pub use errors::ProbeError;
pub use probe::{build_probe, Probe, ProbeSettings};
