//! Runner error types.
//!
//! Every per-check failure is reported with its own variant, never collapsed
//! to a generic "failed". Only plan loading and cluster client construction
//! abort a run; everything else downgrades a single target or check.

use crate::cluster::ClusterError;
use std::time::Duration;
use thiserror::Error;

/// Runner error type.
///
/// Each variant carries a stable code for the report:
/// - MalformedPlan: MALFORMED_PLAN
/// - PlanUnreadable: PLAN_UNREADABLE
/// - InvalidSelectionMode: INVALID_SELECTION_MODE
/// - InvalidPodPattern: INVALID_POD_PATTERN
/// - NoPodsFound: NO_PODS_FOUND
/// - NoReadyPods: NO_READY_PODS
/// - InvalidEndpoint: INVALID_ENDPOINT
/// - NoPodIp: NO_POD_IP
/// - LaunchFailed: LAUNCH_FAILED
/// - ContainerNotFound: CONTAINER_NOT_FOUND
/// - PollTimeout: POLL_TIMEOUT
/// - Cancelled: CANCELLED
/// - Cluster: CLUSTER_ERROR
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Malformed test plan: {0}")]
    MalformedPlan(String),

    #[error("Unable to read test plan: {0}")]
    PlanUnreadable(String),

    #[error("Invalid pod selection mode: {0}")]
    InvalidSelectionMode(String),

    #[error("Invalid pod name pattern: {0}")]
    InvalidPodPattern(String),

    #[error("No pods found in namespace {namespace:?} matching {selector}")]
    NoPodsFound { namespace: String, selector: String },

    #[error("No ready pods found")]
    NoReadyPods,

    #[error("Invalid endpoint {endpoint:?}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("Pod {pod} has no IP address yet")]
    NoPodIp { pod: String },

    #[error("Failed to launch ephemeral probe container: {0}")]
    LaunchFailed(#[source] ClusterError),

    #[error("Ephemeral container {container} never appeared in pod {pod}")]
    ContainerNotFound { pod: String, container: String },

    #[error("Ephemeral container {container} in pod {pod} did not terminate within {timeout:?}")]
    PollTimeout {
        pod: String,
        container: String,
        timeout: Duration,
    },

    #[error("Cancelled before the check completed")]
    Cancelled,

    #[error(transparent)]
    Cluster(#[from] ClusterError),
}

impl RunnerError {
    /// Stable code used in the report.
    pub fn code(&self) -> &'static str {
        match self {
            RunnerError::MalformedPlan(_) => "MALFORMED_PLAN",
            RunnerError::PlanUnreadable(_) => "PLAN_UNREADABLE",
            RunnerError::InvalidSelectionMode(_) => "INVALID_SELECTION_MODE",
            RunnerError::InvalidPodPattern(_) => "INVALID_POD_PATTERN",
            RunnerError::NoPodsFound { .. } => "NO_PODS_FOUND",
            RunnerError::NoReadyPods => "NO_READY_PODS",
            RunnerError::InvalidEndpoint { .. } => "INVALID_ENDPOINT",
            RunnerError::NoPodIp { .. } => "NO_POD_IP",
            RunnerError::LaunchFailed(_) => "LAUNCH_FAILED",
            RunnerError::ContainerNotFound { .. } => "CONTAINER_NOT_FOUND",
            RunnerError::PollTimeout { .. } => "POLL_TIMEOUT",
            RunnerError::Cancelled => "CANCELLED",
            RunnerError::Cluster(_) => "CLUSTER_ERROR",
        }
    }

    /// Whether this error aborts the whole run rather than a single unit.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RunnerError::MalformedPlan(_) | RunnerError::PlanUnreadable(_)
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_display_no_pods_found() {
        let error = RunnerError::NoPodsFound {
            namespace: "kube-system".to_string(),
            selector: "labels: k8s-app=kube-dns".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "No pods found in namespace \"kube-system\" matching labels: k8s-app=kube-dns"
        );
    }

    #[test]
    fn test_display_poll_timeout() {
        let error = RunnerError::PollTimeout {
            pod: "default/web-0".to_string(),
            container: "netcheck-probe-1".to_string(),
            timeout: Duration::from_secs(30),
        };
        assert_eq!(
            error.to_string(),
            "Ephemeral container netcheck-probe-1 in pod default/web-0 did not terminate within 30s"
        );
    }

    #[test]
    fn test_launch_failed_keeps_cause() {
        use std::error::Error as _;

        let error = RunnerError::LaunchFailed(ClusterError::EphemeralContainersUnsupported(
            "the server could not find the requested resource".to_string(),
        ));
        assert!(error.source().is_some());
        assert!(error.to_string().starts_with("Failed to launch"));
    }

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            RunnerError::MalformedPlan(String::new()),
            RunnerError::PlanUnreadable(String::new()),
            RunnerError::InvalidSelectionMode(String::new()),
            RunnerError::InvalidPodPattern(String::new()),
            RunnerError::NoPodsFound {
                namespace: String::new(),
                selector: String::new(),
            },
            RunnerError::NoReadyPods,
            RunnerError::InvalidEndpoint {
                endpoint: String::new(),
                reason: String::new(),
            },
            RunnerError::NoPodIp { pod: String::new() },
            RunnerError::LaunchFailed(ClusterError::Request(String::new())),
            RunnerError::ContainerNotFound {
                pod: String::new(),
                container: String::new(),
            },
            RunnerError::PollTimeout {
                pod: String::new(),
                container: String::new(),
                timeout: Duration::ZERO,
            },
            RunnerError::Cancelled,
            RunnerError::Cluster(ClusterError::Request(String::new())),
        ];

        let mut codes: Vec<&str> = errors.iter().map(RunnerError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_only_plan_errors_are_fatal() {
        assert!(RunnerError::MalformedPlan("x".to_string()).is_fatal());
        assert!(RunnerError::PlanUnreadable("x".to_string()).is_fatal());
        assert!(!RunnerError::NoReadyPods.is_fatal());
        assert!(!RunnerError::Cancelled.is_fatal());
    }
}
