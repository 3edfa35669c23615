//! Probe trait and construction from command-line settings.

use crate::dns::DnsProbe;
use crate::errors::ProbeError;
use crate::http::HttpProbe;
use crate::tcp::TcpProbe;
use common::types::ProbeKind;
use std::future::Future;
use std::time::Duration;

/// A single network check.
#[async_trait::async_trait]
pub trait Probe: Send + Sync {
    /// Run the check once. `Ok(())` means the check passed, including the
    /// case where a failure was expected and observed.
    async fn run(&self) -> Result<(), ProbeError>;
}

/// Parsed probe parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeSettings {
    pub kind: ProbeKind,
    pub target: String,
    pub timeout: Duration,
    pub expected_status: u16,
    pub expect_fail: bool,
}

/// Build the probe for the given settings.
///
/// `expected_status` only applies to HTTP; `expect_fail` only to TCP and DNS.
pub fn build_probe(settings: &ProbeSettings) -> Box<dyn Probe> {
    match settings.kind {
        ProbeKind::Http => Box::new(HttpProbe::new(
            settings.target.clone(),
            settings.timeout,
            settings.expected_status,
        )),
        ProbeKind::Tcp => Box::new(TcpProbe::new(
            settings.target.clone(),
            settings.timeout,
            settings.expect_fail,
        )),
        ProbeKind::Dns => Box::new(DnsProbe::new(
            settings.target.clone(),
            settings.timeout,
            settings.expect_fail,
        )),
    }
}

/// Run `fut` under `timeout`, folding an elapsed deadline into the error side.
pub(crate) async fn within<T, E, F>(timeout: Duration, fut: F) -> Result<T, String>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {}", humantime::format_duration(timeout))),
    }
}

/// Apply expect-fail inversion to a connection attempt.
pub(crate) fn expect_outcome<T>(attempt: Result<T, String>, expect_fail: bool) -> Result<(), ProbeError> {
    match (attempt, expect_fail) {
        (Ok(_), false) | (Err(_), true) => Ok(()),
        (Ok(_), true) => Err(ProbeError::ConnectionSucceeded),
        (Err(reason), false) => Err(ProbeError::ConnectionFailed(reason)),
    }
}
