//! Process exit codes and orchestrator-level normalization.
//!
//! The probe reports a small set of codes. The runner folds whatever code the
//! probe produced into a binary pass/fail with [`normalize`].

/// Check passed.
pub const SUCCESS: i32 = 0;

/// Check failed (connection failure, or any non-zero code after normalization).
pub const FAILURE: i32 = 1;

/// Invalid flags, configuration or input document.
pub const CONFIG_ERROR: i32 = 2;

/// Probe connected but the outcome contradicted the expectation.
pub const ASSERTION_FAILED: i32 = 3;

/// Invert pass/fail for a check that was expected to fail.
///
/// `0` becomes [`FAILURE`] and any non-zero code becomes [`SUCCESS`]. A check
/// that was not expected to fail is returned unchanged.
#[must_use]
pub fn invert_expectation(expect_fail: bool, code: i32) -> i32 {
    if !expect_fail {
        return code;
    }
    if code == SUCCESS {
        FAILURE
    } else {
        SUCCESS
    }
}

/// Clamp every non-zero code to [`FAILURE`].
///
/// Negative codes are failures too.
#[must_use]
pub fn clamp(code: i32) -> i32 {
    if code == SUCCESS {
        SUCCESS
    } else {
        FAILURE
    }
}

/// Normalize a raw exit code to `0` (pass) or `1` (fail).
///
/// Applies [`invert_expectation`] then [`clamp`]. Callers must pass
/// `expect_fail = true` only when the probe did not already invert the
/// outcome itself.
#[must_use]
pub fn normalize(expect_fail: bool, code: i32) -> i32 {
    clamp(invert_expectation(expect_fail, code))
}
