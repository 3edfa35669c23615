//! Single checks against pods picked by name pattern.
//!
//! `check` probes any endpoint from one pod. `check-pod` probes a TCP port on
//! a second pod's IP address, resolved from that pod's status.

use crate::cluster::PodRef;
use crate::engine::{CheckOutcome, TestEngine};
use crate::errors::RunnerError;
use crate::plan::Test;
use crate::report::Reporter;
use crate::selector::is_pod_ready;
use common::types::ProbeKind;
use k8s_openapi::api::core::v1::Pod;
use regex::Regex;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tracing::info;

/// A check requested directly from the command line.
#[derive(Debug, Clone)]
pub struct AdHocCheck {
    pub namespace: String,
    /// Regular expression matched against pod names.
    pub pod_pattern: String,
    pub test: Test,
}

/// A TCP check from one pod to a port on another pod.
#[derive(Debug, Clone)]
pub struct PodToPodCheck {
    pub namespace: String,
    /// Regular expression matched against source pod names.
    pub pod_pattern: String,
    pub to_namespace: String,
    /// Regular expression matched against destination pod names.
    pub to_pod_pattern: String,
    pub port: u16,
    pub expect_fail: bool,
    pub timeout: Option<Duration>,
    pub probe_image: Option<String>,
}

/// First ready pod, in list order, whose name matches `pattern`.
///
/// # Errors
///
/// - `RunnerError::NoPodsFound` - no pod name matches
/// - `RunnerError::NoReadyPods` - matching pods exist but none is ready
pub fn first_ready_match<'a>(
    pods: &'a [Pod],
    pattern: &Regex,
    namespace: &str,
) -> Result<&'a Pod, RunnerError> {
    let mut matching = pods
        .iter()
        .filter(|pod| {
            pod.metadata
                .name
                .as_deref()
                .is_some_and(|name| pattern.is_match(name))
        })
        .peekable();

    if matching.peek().is_none() {
        return Err(RunnerError::NoPodsFound {
            namespace: namespace.to_string(),
            selector: format!("name pattern {}", pattern.as_str()),
        });
    }

    matching
        .find(|pod| is_pod_ready(pod))
        .ok_or(RunnerError::NoReadyPods)
}

/// Run `check` through the engine and report it.
///
/// # Errors
///
/// - `RunnerError::InvalidPodPattern` - the pattern is not a valid regex
/// - `RunnerError::NoPodsFound`, `RunnerError::NoReadyPods` - see
///   [`first_ready_match`]
/// - `RunnerError::Cluster` - listing pods failed
///
/// A check that runs but errors is reported through the returned outcome.
pub async fn run_adhoc_check(
    engine: &TestEngine,
    check: &AdHocCheck,
    reporter: &mut Reporter,
) -> Result<CheckOutcome, RunnerError> {
    let pattern = compile_pattern(&check.pod_pattern)?;
    let pod = find_ready_pod(engine, &check.namespace, &pattern).await?;
    let pod_ref = PodRef::of(&pod);

    info!(
        target: "netcheck.runner.adhoc",
        pod = %pod_ref,
        endpoint = %check.test.endpoint,
        "Running ad-hoc check"
    );

    let outcome = engine.run_check(&pod, &check.test).await;
    reporter.check(&pod_ref.to_string(), &outcome);
    Ok(outcome)
}

/// Run a TCP check from the first ready source pod to `port` on the first
/// ready destination pod, and report it.
///
/// # Errors
///
/// - `RunnerError::InvalidPodPattern` - either pattern is not a valid regex
/// - `RunnerError::NoPodsFound`, `RunnerError::NoReadyPods` - for either side
/// - `RunnerError::NoPodIp` - the destination pod has no IP address
/// - `RunnerError::Cluster` - listing pods failed
pub async fn run_pod_to_pod_check(
    engine: &TestEngine,
    check: &PodToPodCheck,
    reporter: &mut Reporter,
) -> Result<CheckOutcome, RunnerError> {
    let from_pattern = compile_pattern(&check.pod_pattern)?;
    let to_pattern = compile_pattern(&check.to_pod_pattern)?;

    let source = find_ready_pod(engine, &check.namespace, &from_pattern).await?;
    let destination = find_ready_pod(engine, &check.to_namespace, &to_pattern).await?;

    let source_ref = PodRef::of(&source);
    let destination_ref = PodRef::of(&destination);
    let test = Test {
        name: format!("{source_ref} -> {destination_ref}"),
        endpoint: pod_endpoint(&destination, check.port)?,
        status_code: 0,
        kind: ProbeKind::Tcp,
        expect_fail: check.expect_fail,
        timeout: check.timeout,
        probe_image: check.probe_image.clone(),
    };

    info!(
        target: "netcheck.runner.adhoc",
        pod = %source_ref,
        destination = %destination_ref,
        endpoint = %test.endpoint,
        "Running pod-to-pod check"
    );

    let outcome = engine.run_check(&source, &test).await;
    reporter.check(&source_ref.to_string(), &outcome);
    Ok(outcome)
}

/// `ip:port` of `pod`, with IPv6 addresses bracketed.
///
/// # Errors
///
/// - `RunnerError::NoPodIp` - the pod status carries no IP address
pub fn pod_endpoint(pod: &Pod, port: u16) -> Result<String, RunnerError> {
    let ip = pod
        .status
        .as_ref()
        .and_then(|status| status.pod_ip.as_deref())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .ok_or_else(|| RunnerError::NoPodIp {
            pod: PodRef::of(pod).to_string(),
        })?;

    Ok(match ip.parse::<IpAddr>() {
        Ok(addr) => SocketAddr::new(addr, port).to_string(),
        Err(_) => format!("{ip}:{port}"),
    })
}

fn compile_pattern(pattern: &str) -> Result<Regex, RunnerError> {
    Regex::new(pattern).map_err(|e| RunnerError::InvalidPodPattern(e.to_string()))
}

async fn find_ready_pod(
    engine: &TestEngine,
    namespace: &str,
    pattern: &Regex,
) -> Result<Pod, RunnerError> {
    let pods = engine.client().list_pods(namespace, "", "").await?;
    first_ready_match(&pods, pattern, namespace).cloned()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::cluster::mock::{ready_pod, unready_pod};

    fn pods() -> Vec<Pod> {
        vec![
            unready_pod("shop", "web-7d9f-abc", &[]),
            ready_pod("shop", "db-0", &[]),
            ready_pod("shop", "web-7d9f-def", &[]),
            ready_pod("shop", "web-7d9f-ghi", &[]),
        ]
    }

    #[test]
    fn test_first_ready_match_skips_unready() {
        let pods = pods();
        let pattern = Regex::new("^web-").unwrap();
        let pod = first_ready_match(&pods, &pattern, "shop").unwrap();
        assert_eq!(pod.metadata.name.as_deref(), Some("web-7d9f-def"));
    }

    #[test]
    fn test_no_name_match() {
        let pods = pods();
        let pattern = Regex::new("^api-").unwrap();
        let err = first_ready_match(&pods, &pattern, "shop").unwrap_err();
        assert!(matches!(err, RunnerError::NoPodsFound { .. }));
    }

    #[test]
    fn test_match_without_ready_pod() {
        let pods = pods();
        let pattern = Regex::new("abc$").unwrap();
        let err = first_ready_match(&pods, &pattern, "shop").unwrap_err();
        assert!(matches!(err, RunnerError::NoReadyPods));
    }

    fn pod_with_ip(name: &str, ip: Option<&str>) -> Pod {
        let mut pod = ready_pod("shop", name, &[]);
        if let Some(status) = pod.status.as_mut() {
            status.pod_ip = ip.map(str::to_string);
        }
        pod
    }

    #[test]
    fn test_pod_endpoint() {
        assert_eq!(
            pod_endpoint(&pod_with_ip("db-0", Some("10.1.2.3")), 5432).unwrap(),
            "10.1.2.3:5432"
        );
        assert_eq!(
            pod_endpoint(&pod_with_ip("db-0", Some("fd00::17")), 5432).unwrap(),
            "[fd00::17]:5432"
        );
    }

    #[test]
    fn test_pod_endpoint_without_ip() {
        for ip in [None, Some(""), Some("  ")] {
            let err = pod_endpoint(&pod_with_ip("db-0", ip), 5432).unwrap_err();
            assert!(
                matches!(&err, RunnerError::NoPodIp { pod } if pod == "shop/db-0"),
                "{err:?}"
            );
        }
    }
}
