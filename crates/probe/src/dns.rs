//! DNS lookup probe.

use crate::errors::ProbeError;
use crate::probe::{expect_outcome, within, Probe};
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::lookup_host;
use tracing::debug;

/// Resolves a host name and optionally expects resolution to fail.
#[derive(Debug, Clone)]
pub struct DnsProbe {
    host: String,
    timeout: Duration,
    expect_fail: bool,
}

impl DnsProbe {
    pub fn new(host: impl Into<String>, timeout: Duration, expect_fail: bool) -> Self {
        Self {
            host: host.into(),
            timeout,
            expect_fail,
        }
    }

    async fn resolve(&self) -> io::Result<Vec<SocketAddr>> {
        // `host:port` is accepted as-is; a bare host gets a placeholder port.
        let addrs: Vec<SocketAddr> = if let Some(addr) = literal_addr(&self.host) {
            vec![addr]
        } else if self.host.contains(':') {
            lookup_host(self.host.as_str()).await?.collect()
        } else {
            lookup_host((self.host.as_str(), 0)).await?.collect()
        };

        if addrs.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no addresses found for {}", self.host),
            ));
        }
        Ok(addrs)
    }
}

// IP literals, with or without a port. IPv6 may be bracketed.
fn literal_addr(host: &str) -> Option<SocketAddr> {
    if let Ok(addr) = host.parse::<SocketAddr>() {
        return Some(addr);
    }
    let bare = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    bare.parse::<IpAddr>().ok().map(|ip| SocketAddr::new(ip, 0))
}

#[async_trait::async_trait]
impl Probe for DnsProbe {
    async fn run(&self) -> Result<(), ProbeError> {
        let attempt = within(self.timeout, self.resolve()).await;
        debug!(
            target: "netcheck.probe.dns",
            host = %self.host,
            resolved = attempt.as_ref().map(Vec::len).unwrap_or(0),
            expect_fail = self.expect_fail,
            "DNS lookup finished"
        );
        expect_outcome(attempt, self.expect_fail)
    }
}
