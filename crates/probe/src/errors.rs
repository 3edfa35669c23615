//! Probe error types.
//!
//! Each variant maps to a process exit code via [`ProbeError::exit_code`]:
//! - `ConnectionFailed`: 1
//! - `InvalidFlags`: 2 (configuration error)
//! - `ConnectionSucceeded`, `StatusMismatch`: 3 (assertion failed)

use common::exit_code;
use thiserror::Error;

/// Outcome of a probe that did not pass.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("invalid flags: {0}")]
    InvalidFlags(String),

    #[error("assertion failed: connection succeeded when expecting a failure")]
    ConnectionSucceeded,

    #[error("assertion failed: expecting response code {expected}, got {actual}")]
    StatusMismatch { expected: u16, actual: u16 },
}

impl ProbeError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            ProbeError::ConnectionFailed(_) => exit_code::FAILURE,
            ProbeError::InvalidFlags(_) => exit_code::CONFIG_ERROR,
            ProbeError::ConnectionSucceeded | ProbeError::StatusMismatch { .. } => {
                exit_code::ASSERTION_FAILED
            }
        }
    }
}
