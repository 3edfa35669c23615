//! Exit status interpretation.
//!
//! Exactly one layer inverts an expected failure. TCP and DNS probes receive
//! `--expect-fail` and invert their own outcome, so the runner only clamps
//! their code. HTTP probes never see the flag, so the runner inverts here.

use crate::errors::RunnerError;
use common::exit_code::{normalize, FAILURE, SUCCESS};
use common::types::ProbeKind;
use std::fmt;

/// Result of one check against one pod.
#[derive(Debug)]
pub enum Verdict {
    Passed,
    /// The probe ran and the check failed. Carries the probe's raw exit code.
    Failed { exit_code: i32 },
    /// The check could not be carried out.
    Error(RunnerError),
}

impl Verdict {
    pub fn is_passed(&self) -> bool {
        matches!(self, Verdict::Passed)
    }

    /// Normalized process exit code: 0 when passed, 1 otherwise.
    pub fn exit_code(&self) -> i32 {
        match self {
            Verdict::Passed => SUCCESS,
            Verdict::Failed { .. } | Verdict::Error(_) => FAILURE,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Passed => write!(f, "PASSED"),
            Verdict::Failed { exit_code } => write!(f, "FAILED (exit code: {exit_code})"),
            Verdict::Error(e) => write!(f, "ERROR [{}] {e}", e.code()),
        }
    }
}

/// Whether the runner, rather than the probe, applies `expect_fail`.
pub fn runner_inverts(kind: ProbeKind, expect_fail: bool) -> bool {
    expect_fail && !kind.supports_expect_fail()
}

/// Turn a probe's raw exit code into a verdict.
pub fn interpret_exit_code(kind: ProbeKind, expect_fail: bool, raw: i32) -> Verdict {
    if normalize(runner_inverts(kind, expect_fail), raw) == SUCCESS {
        Verdict::Passed
    } else {
        Verdict::Failed { exit_code: raw }
    }
}
