//! Command-line contract between the runner and the probe executable.
//!
//! The runner builds probe arguments from these names and the probe parses
//! them, so both sides agree on spelling.

/// Target URL (HTTP), `host:port` (TCP) or host name (DNS).
pub const ARG_URL: &str = "url";

/// Alias accepted by the probe for [`ARG_URL`].
pub const ARG_ENDPOINT: &str = "endpoint";

/// Probe timeout, as a human-readable duration (`5s`, `1m 30s`).
pub const ARG_TIMEOUT: &str = "timeout";

/// Expected HTTP status code; `0` expects a connection failure.
pub const ARG_EXPECTED_STATUS: &str = "expected-status";

/// Invert the outcome of a TCP or DNS probe.
pub const ARG_EXPECT_FAIL: &str = "expect-fail";

/// Probe kind: `http`, `tcp` or `dns`.
pub const ARG_TYPE: &str = "type";

/// Turn a flag name into its long command-line form.
#[must_use]
pub fn flagify(name: &str) -> String {
    format!("--{name}")
}
