//! Ephemeral probe container injection.
//!
//! A probe is launched by diffing the pod's ephemeral container list against
//! the same list with one probe container appended, and sending that diff as a
//! strategic merge patch to the pod's `ephemeralcontainers` subresource. No
//! other field of the pod is touched. Injected containers are never removed.

use crate::cluster::{ClusterClient, ClusterError, PodRef};
use crate::errors::RunnerError;
use crate::plan::Test;
use chrono::{DateTime, Utc};
use common::probe_flags::{
    flagify, ARG_EXPECTED_STATUS, ARG_EXPECT_FAIL, ARG_TIMEOUT, ARG_TYPE, ARG_URL,
};
use k8s_openapi::api::core::v1::{EphemeralContainer, Pod};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{info, instrument};

/// Prefix of every injected container name.
pub const CONTAINER_NAME_PREFIX: &str = "netcheck-probe";

static LAUNCH_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A launched probe container, consumed once by the poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EphemeralProbeHandle {
    pub pod: PodRef,
    pub container_name: String,
    pub launched_at: DateTime<Utc>,
}

/// Injects probe containers into pods.
#[derive(Debug, Clone)]
pub struct ProbeLauncher {
    default_image: String,
    command: String,
}

impl ProbeLauncher {
    pub fn new(default_image: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            default_image: default_image.into(),
            command: command.into(),
        }
    }

    /// Image for a check: the override when non-empty, else the default.
    pub fn image_for<'a>(&'a self, image_override: Option<&'a str>) -> &'a str {
        image_override
            .map(str::trim)
            .filter(|image| !image.is_empty())
            .unwrap_or(self.default_image.as_str())
    }

    /// Append a probe container running `args` to `pod`.
    ///
    /// Returns the patched pod as reported by the API server together with
    /// the handle of the new container.
    ///
    /// # Errors
    ///
    /// - `RunnerError::LaunchFailed` - the patch could not be built or was
    ///   rejected, including clusters without ephemeral container support
    #[instrument(skip_all, fields(pod = %PodRef::of(pod)))]
    pub async fn launch(
        &self,
        client: &dyn ClusterClient,
        pod: &Pod,
        image_override: Option<&str>,
        args: Vec<String>,
    ) -> Result<(Pod, EphemeralProbeHandle), RunnerError> {
        let pod_ref = PodRef::of(pod);
        let container_name = unique_container_name();
        let image = self.image_for(image_override).to_string();

        let container = EphemeralContainer {
            name: container_name.clone(),
            image: Some(image.clone()),
            command: Some(vec![self.command.clone()]),
            args: Some(args),
            ..Default::default()
        };

        let patch = ephemeral_containers_patch(pod, &container).map_err(RunnerError::LaunchFailed)?;
        let patched = client
            .patch_ephemeral_containers(&pod_ref, &patch)
            .await
            .map_err(RunnerError::LaunchFailed)?;

        info!(
            target: "netcheck.runner.launcher",
            pod = %pod_ref,
            container = %container_name,
            image = %image,
            "Launched ephemeral probe container"
        );

        Ok((
            patched,
            EphemeralProbeHandle {
                pod: pod_ref,
                container_name,
                launched_at: Utc::now(),
            },
        ))
    }
}

/// A container name unique within this process.
///
/// Combines a nanosecond timestamp with a process-wide counter so that
/// launches in the same instant still differ.
pub fn unique_container_name() -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let sequence = LAUNCH_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{CONTAINER_NAME_PREFIX}-{nanos}-{sequence}")
}

/// Probe command-line arguments for a check.
///
/// `--expect-fail` is only forwarded to probe kinds that invert their own
/// outcome.
pub fn probe_args(test: &Test, timeout: Duration) -> Vec<String> {
    let mut args = vec![
        flagify(ARG_URL),
        test.endpoint.clone(),
        flagify(ARG_TYPE),
        test.kind.as_str().to_string(),
        flagify(ARG_TIMEOUT),
        humantime::format_duration(timeout).to_string(),
        flagify(ARG_EXPECTED_STATUS),
        test.status_code.to_string(),
    ];
    if test.expect_fail && test.kind.supports_expect_fail() {
        args.push(flagify(ARG_EXPECT_FAIL));
    }
    args
}

/// Strategic merge patch adding `container` to the pod's ephemeral containers.
///
/// # Errors
///
/// - `ClusterError::Encoding` - the containers could not be serialized
pub fn ephemeral_containers_patch(
    pod: &Pod,
    container: &EphemeralContainer,
) -> Result<Value, ClusterError> {
    let current = pod
        .spec
        .as_ref()
        .and_then(|spec| spec.ephemeral_containers.clone())
        .unwrap_or_default();
    let mut modified = current.clone();
    modified.push(container.clone());

    let original = to_values(&current)?;
    let modified = to_values(&modified)?;

    Ok(json!({
        "spec": {
            "ephemeralContainers": diff_by_name(&original, &modified),
        }
    }))
}

fn to_values(containers: &[EphemeralContainer]) -> Result<Vec<Value>, ClusterError> {
    containers
        .iter()
        .map(|c| serde_json::to_value(c).map_err(|e| ClusterError::Encoding(e.to_string())))
        .collect()
}

// Entries of `modified` that are new or changed, keyed by `name`. Ephemeral
// containers cannot be removed, so deletions are never emitted.
fn diff_by_name(original: &[Value], modified: &[Value]) -> Vec<Value> {
    modified
        .iter()
        .filter(|entry| {
            let name = entry.get("name");
            !original
                .iter()
                .any(|existing| existing.get("name") == name && *existing == **entry)
        })
        .cloned()
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::cluster::mock::{ready_pod, MockClusterClient};
    use common::types::ProbeKind;
    use k8s_openapi::api::core::v1::PodSpec;
    use std::collections::HashSet;

    fn test_check(kind: ProbeKind, expect_fail: bool) -> Test {
        Test {
            name: "check".to_string(),
            endpoint: "db.data.svc:5432".to_string(),
            status_code: 0,
            kind,
            expect_fail,
            timeout: None,
            probe_image: None,
        }
    }

    fn existing_container(name: &str) -> EphemeralContainer {
        EphemeralContainer {
            name: name.to_string(),
            image: Some("busybox".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_container_names_are_unique() {
        let names: HashSet<String> = (0..1000).map(|_| unique_container_name()).collect();
        assert_eq!(names.len(), 1000);
        assert!(names.iter().all(|n| n.starts_with("netcheck-probe-")));
        assert!(names.iter().all(|n| n.len() <= 63));
    }

    #[test]
    fn test_image_for_override() {
        let launcher = ProbeLauncher::new("netcheck-probe:latest", "/netcheck-probe");
        assert_eq!(launcher.image_for(None), "netcheck-probe:latest");
        assert_eq!(launcher.image_for(Some("")), "netcheck-probe:latest");
        assert_eq!(launcher.image_for(Some("  ")), "netcheck-probe:latest");
        assert_eq!(
            launcher.image_for(Some("myregistry.io/custom-probe:v2.0.0")),
            "myregistry.io/custom-probe:v2.0.0"
        );
    }

    #[test]
    fn test_probe_args_forward_expect_fail_for_tcp() {
        let args = probe_args(&test_check(ProbeKind::Tcp, true), Duration::from_secs(2));
        assert_eq!(
            args,
            vec![
                "--url",
                "db.data.svc:5432",
                "--type",
                "tcp",
                "--timeout",
                "2s",
                "--expected-status",
                "0",
                "--expect-fail",
            ]
        );
    }

    #[test]
    fn test_probe_args_keep_expect_fail_from_http() {
        let args = probe_args(&test_check(ProbeKind::Http, true), Duration::from_secs(5));
        assert!(!args.contains(&"--expect-fail".to_string()));
        assert!(args.contains(&"http".to_string()));
    }

    #[test]
    fn test_patch_contains_only_new_container() {
        let mut pod = ready_pod("shop", "web-0", &[]);
        pod.spec = Some(PodSpec {
            ephemeral_containers: Some(vec![existing_container("debugger")]),
            ..Default::default()
        });

        let probe = existing_container("netcheck-probe-1");
        let patch = ephemeral_containers_patch(&pod, &probe).unwrap();

        let added = patch["spec"]["ephemeralContainers"].as_array().unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(added[0]["name"], "netcheck-probe-1");
        assert_eq!(patch.as_object().unwrap().len(), 1);
        assert_eq!(patch["spec"].as_object().unwrap().len(), 1);
    }

    #[test]
    fn test_patch_for_pod_without_spec() {
        let pod = Pod::default();
        let patch = ephemeral_containers_patch(&pod, &existing_container("probe")).unwrap();
        assert_eq!(patch["spec"]["ephemeralContainers"][0]["name"], "probe");
    }

    #[tokio::test]
    async fn test_launch_appends_probe_container() {
        let client = MockClusterClient::with_pods([ready_pod("shop", "web-0", &[])]);
        let launcher = ProbeLauncher::new("netcheck-probe:latest", "/netcheck-probe");
        let pod = ready_pod("shop", "web-0", &[]);

        let (patched, handle) = launcher
            .launch(&client, &pod, None, vec!["--url".to_string(), "x".to_string()])
            .await
            .unwrap();

        assert_eq!(handle.pod, PodRef::new("shop", "web-0"));
        let containers = patched.spec.unwrap().ephemeral_containers.unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].name, handle.container_name);
        assert_eq!(containers[0].image.as_deref(), Some("netcheck-probe:latest"));
        assert_eq!(
            containers[0].command,
            Some(vec!["/netcheck-probe".to_string()])
        );
        assert_eq!(
            containers[0].args,
            Some(vec!["--url".to_string(), "x".to_string()])
        );
    }

    #[tokio::test]
    async fn test_repeated_launches_do_not_collide() {
        let client = MockClusterClient::with_pods([ready_pod("shop", "web-0", &[])]);
        let launcher = ProbeLauncher::new("netcheck-probe:latest", "/netcheck-probe");
        let pod = ready_pod("shop", "web-0", &[]);

        let (_, first) = launcher.launch(&client, &pod, None, Vec::new()).await.unwrap();
        let (_, second) = launcher.launch(&client, &pod, None, Vec::new()).await.unwrap();

        assert_ne!(first.container_name, second.container_name);
        assert_eq!(
            client
                .ephemeral_containers(&PodRef::new("shop", "web-0"))
                .len(),
            2
        );
    }

    #[tokio::test]
    async fn test_launch_failure_keeps_cause() {
        let client = MockClusterClient::with_pods([ready_pod("shop", "web-0", &[])]).failing_patch(
            ClusterError::EphemeralContainersUnsupported("not found".to_string()),
        );
        let launcher = ProbeLauncher::new("netcheck-probe:latest", "/netcheck-probe");

        let err = launcher
            .launch(&client, &ready_pod("shop", "web-0", &[]), None, Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RunnerError::LaunchFailed(ClusterError::EphemeralContainersUnsupported(_))
        ));
    }
}
