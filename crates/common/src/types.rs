//! Common data types for netcheck components.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Kind of network check a probe performs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// HTTP(S) request with an expected status code
    #[default]
    Http,
    /// Plain TCP dial
    Tcp,
    /// DNS host lookup
    Dns,
}

impl ProbeKind {
    /// Wire name passed to the probe via `--type`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeKind::Http => "http",
            ProbeKind::Tcp => "tcp",
            ProbeKind::Dns => "dns",
        }
    }

    /// Whether the probe itself understands `--expect-fail`.
    #[must_use]
    pub fn supports_expect_fail(&self) -> bool {
        matches!(self, ProbeKind::Tcp | ProbeKind::Dns)
    }
}

impl fmt::Display for ProbeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a probe kind string is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid probe type: {0:?}")]
pub struct InvalidProbeKind(pub String);

impl FromStr for ProbeKind {
    type Err = InvalidProbeKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" | "https" => Ok(ProbeKind::Http),
            "tcp" => Ok(ProbeKind::Tcp),
            "dns" => Ok(ProbeKind::Dns),
            _ => Err(InvalidProbeKind(s.to_string())),
        }
    }
}
