//! HTTP request probe.
//!
//! The expected status code doubles as the expectation switch: `0` means the
//! request is expected not to connect at all.

use crate::errors::ProbeError;
use crate::probe::Probe;
use std::time::Duration;
use tracing::debug;

/// Status code meaning "expect the connection to fail".
pub const EXPECT_CONNECTION_FAILURE: u16 = 0;

/// Issues a GET request and compares the response status.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    url: String,
    timeout: Duration,
    expected_status: u16,
}

impl HttpProbe {
    pub fn new(url: impl Into<String>, timeout: Duration, expected_status: u16) -> Self {
        Self {
            url: url.into(),
            timeout,
            expected_status,
        }
    }
}

#[async_trait::async_trait]
impl Probe for HttpProbe {
    async fn run(&self) -> Result<(), ProbeError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ProbeError::ConnectionFailed(format!("building HTTP client: {e}")))?;

        let response = match client.get(&self.url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(target: "netcheck.probe.http", url = %self.url, error = %e, "HTTP request failed");
                if self.expected_status == EXPECT_CONNECTION_FAILURE {
                    return Ok(());
                }
                return Err(ProbeError::ConnectionFailed(e.to_string()));
            }
        };

        let actual = response.status().as_u16();
        debug!(target: "netcheck.probe.http", url = %self.url, status = actual, "HTTP response received");

        if self.expected_status == EXPECT_CONNECTION_FAILURE {
            return Err(ProbeError::ConnectionSucceeded);
        }
        if actual != self.expected_status {
            return Err(ProbeError::StatusMismatch {
                expected: self.expected_status,
                actual,
            });
        }
        Ok(())
    }
}
