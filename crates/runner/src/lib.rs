//! Netcheck Runner Library
//!
//! Executes declarative connectivity test plans against pods in a live
//! Kubernetes cluster. Each check runs inside the target pod as a short-lived
//! ephemeral container, so the pod's deployed spec is never modified.
//!
//! # Pipeline
//!
//! ```text
//! plan -> selector -> launcher -> poller -> verdict -> engine -> report
//! ```
//!
//! # Modules
//!
//! - `config` - Runner configuration from environment
//! - `errors` - Error taxonomy with stable report codes
//! - `plan` - Test plan document model and strict parsing
//! - `cluster` - Cluster API seam, kube-backed client and in-memory mock
//! - `selector` - Ready-pod filtering and all/random selection
//! - `launcher` - Ephemeral probe container injection
//! - `poller` - Probe container completion polling
//! - `verdict` - Exit status interpretation
//! - `engine` - Test execution driver
//! - `report` - Human-readable result stream
//! - `adhoc` - Single checks from pods picked by name pattern

pub mod adhoc;
pub mod cluster;
pub mod config;
pub mod engine;
pub mod errors;
pub mod launcher;
pub mod plan;
pub mod poller;
pub mod report;
pub mod selector;
pub mod verdict;
