//! TCP dial probe.

use crate::errors::ProbeError;
use crate::probe::{expect_outcome, within, Probe};
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Dials `host:port` and optionally expects the dial to fail.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    addr: String,
    timeout: Duration,
    expect_fail: bool,
}

impl TcpProbe {
    pub fn new(addr: impl Into<String>, timeout: Duration, expect_fail: bool) -> Self {
        Self {
            addr: addr.into(),
            timeout,
            expect_fail,
        }
    }
}

#[async_trait::async_trait]
impl Probe for TcpProbe {
    async fn run(&self) -> Result<(), ProbeError> {
        let attempt = within(self.timeout, TcpStream::connect(self.addr.as_str())).await;
        debug!(
            target: "netcheck.probe.tcp",
            addr = %self.addr,
            connected = attempt.is_ok(),
            expect_fail = self.expect_fail,
            "TCP dial finished"
        );
        // The stream, if any, is dropped here which closes the connection.
        expect_outcome(attempt, self.expect_fail)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    const TIMEOUT: Duration = Duration::from_secs(2);

    async fn closed_port_addr() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);
        addr
    }

    #[tokio::test]
    async fn test_connects_to_open_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let probe = TcpProbe::new(listener.local_addr().unwrap().to_string(), TIMEOUT, false);

        assert_eq!(probe.run().await, Ok(()));
    }

    #[tokio::test]
    async fn test_open_port_fails_when_expecting_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let probe = TcpProbe::new(listener.local_addr().unwrap().to_string(), TIMEOUT, true);

        assert_eq!(probe.run().await, Err(ProbeError::ConnectionSucceeded));
    }

    #[tokio::test]
    async fn test_closed_port_passes_when_expecting_failure() {
        let probe = TcpProbe::new(closed_port_addr().await, TIMEOUT, true);

        assert_eq!(probe.run().await, Ok(()));
    }

    #[tokio::test]
    async fn test_closed_port_is_connection_failure() {
        let probe = TcpProbe::new(closed_port_addr().await, TIMEOUT, false);

        let err = probe.run().await.unwrap_err();
        assert!(matches!(err, ProbeError::ConnectionFailed(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_address_is_connection_failure() {
        let probe = TcpProbe::new("not an address", TIMEOUT, false);

        assert!(matches!(
            probe.run().await,
            Err(ProbeError::ConnectionFailed(_))
        ));
    }
}
