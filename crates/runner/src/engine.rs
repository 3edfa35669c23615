//! Test execution engine.
//!
//! Drives targets, then selected pods, then checks. Any failure is recorded
//! against the smallest unit it affects and execution continues with the next
//! item. Pods of one target may run concurrently; their outcomes are reported
//! in selection order.

use crate::cluster::{ClusterClient, PodRef};
use crate::config::Config;
use crate::errors::RunnerError;
use crate::launcher::{probe_args, ProbeLauncher};
use crate::plan::{Test, TestPlan, TestTarget};
use crate::poller::{poll_exit_code, PollSettings};
use crate::report::Reporter;
use crate::selector::{find_pods, is_pod_ready, select_pods};
use crate::verdict::{interpret_exit_code, Verdict};
use common::types::ProbeKind;
use futures::stream::{self, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use url::{Host, Url};

/// Slack added to a check's timeout to cover container start-up.
pub const POLL_GRACE: Duration = Duration::from_secs(5);

/// Engine tuning, usually derived from [`Config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub poll_interval: Duration,
    /// Lower bound of every poll deadline.
    pub poll_timeout_floor: Duration,
    /// Probe timeout for tests without one.
    pub check_timeout: Duration,
    /// Pods exercised in parallel per target.
    pub concurrency: usize,
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval,
            poll_timeout_floor: config.poll_timeout,
            check_timeout: config.check_timeout,
            concurrency: config.concurrency,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Outcome of one check against one pod.
#[derive(Debug)]
pub struct CheckOutcome {
    pub test: Test,
    /// Probe timeout actually used.
    pub timeout: Duration,
    /// Probe image actually used.
    pub image: String,
    pub verdict: Verdict,
}

/// Outcomes of every check against one pod.
#[derive(Debug)]
pub struct PodOutcome {
    pub pod: PodRef,
    pub checks: Vec<CheckOutcome>,
}

impl PodOutcome {
    pub fn passed(&self) -> bool {
        self.checks.iter().all(|c| c.verdict.is_passed())
    }
}

/// Outcome of one target.
#[derive(Debug)]
pub struct TargetOutcome {
    pub name: String,
    pub ready_pods: usize,
    pub pods: Vec<PodOutcome>,
    /// Set when the target failed before any check ran.
    pub error: Option<RunnerError>,
}

impl TargetOutcome {
    pub fn passed(&self) -> bool {
        self.error.is_none() && self.pods.iter().all(PodOutcome::passed)
    }
}

/// Check counts across a plan. Target-level errors count as errored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub passed: usize,
    pub failed: usize,
    pub errored: usize,
}

/// Outcome of a whole plan.
#[derive(Debug)]
pub struct PlanOutcome {
    pub name: String,
    pub targets: Vec<TargetOutcome>,
}

impl PlanOutcome {
    /// AND over every target.
    pub fn passed(&self) -> bool {
        self.targets.iter().all(TargetOutcome::passed)
    }

    pub fn counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for target in &self.targets {
            if target.error.is_some() {
                counts.errored += 1;
            }
            for check in target.pods.iter().flat_map(|p| &p.checks) {
                match check.verdict {
                    Verdict::Passed => counts.passed += 1,
                    Verdict::Failed { .. } => counts.failed += 1,
                    Verdict::Error(_) => counts.errored += 1,
                }
            }
        }
        counts
    }
}

/// Poll deadline for a check with the given probe timeout.
pub fn poll_timeout_for(check_timeout: Duration, floor: Duration) -> Duration {
    floor.max(check_timeout.saturating_add(POLL_GRACE))
}

/// Reject endpoints the probe could not use. TCP endpoints are passed
/// through as-is.
///
/// # Errors
///
/// - `RunnerError::InvalidEndpoint` - empty endpoint, unparsable or non-HTTP
///   URL, or invalid DNS host name
pub fn validate_endpoint(kind: ProbeKind, endpoint: &str) -> Result<(), RunnerError> {
    let invalid = |reason: String| RunnerError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    };

    if endpoint.trim().is_empty() {
        return Err(invalid("endpoint is empty".to_string()));
    }

    match kind {
        ProbeKind::Tcp => Ok(()),
        ProbeKind::Http => {
            let url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
            }
            if url.host_str().map_or(true, str::is_empty) {
                return Err(invalid("missing host".to_string()));
            }
            Ok(())
        }
        ProbeKind::Dns => {
            let host = match endpoint.rsplit_once(':') {
                Some((host, port))
                    if !host.contains(':') || (host.starts_with('[') && host.ends_with(']')) =>
                {
                    port.parse::<u16>()
                        .map_err(|e| invalid(format!("invalid port {port:?}: {e}")))?;
                    host
                }
                _ => endpoint,
            };
            if host.contains('/') {
                return Err(invalid("expected a host name, not a URL".to_string()));
            }
            Host::parse(host).map_err(|e| invalid(e.to_string()))?;
            Ok(())
        }
    }
}

/// Runs plans and single checks against a cluster.
pub struct TestEngine {
    client: Arc<dyn ClusterClient>,
    launcher: ProbeLauncher,
    settings: EngineSettings,
    cancel: CancellationToken,
}

impl TestEngine {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        launcher: ProbeLauncher,
        settings: EngineSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            launcher,
            settings,
            cancel,
        }
    }

    pub fn client(&self) -> &dyn ClusterClient {
        self.client.as_ref()
    }

    /// Execute every target of `plan`, streaming the report as it goes.
    ///
    /// Never fails: per-unit errors are recorded in the outcome.
    #[instrument(skip_all, fields(plan = %plan.name))]
    pub async fn execute_test(&self, plan: &TestPlan, reporter: &mut Reporter) -> PlanOutcome {
        reporter.plan_header(plan);

        let mut targets = Vec::with_capacity(plan.test_targets.len());
        for target in &plan.test_targets {
            targets.push(self.run_target(target, reporter).await);
        }

        let outcome = PlanOutcome {
            name: plan.name.clone(),
            targets,
        };
        reporter.summary(&outcome);

        let counts = outcome.counts();
        info!(
            target: "netcheck.runner.engine",
            passed = counts.passed,
            failed = counts.failed,
            errored = counts.errored,
            overall = outcome.passed(),
            "Test plan finished"
        );

        outcome
    }

    async fn run_target(&self, target: &TestTarget, reporter: &mut Reporter) -> TargetOutcome {
        info!(
            target: "netcheck.runner.engine",
            name = %target.name,
            namespace = %target.namespace,
            selector = %target.pod_selector,
            "Running test target"
        );

        if self.cancel.is_cancelled() {
            return target_failed(target, 0, RunnerError::Cancelled, reporter);
        }

        let candidates =
            match find_pods(self.client.as_ref(), &target.namespace, &target.pod_selector).await {
                Ok(pods) => pods,
                Err(e) => return target_failed(target, 0, e, reporter),
            };

        let ready_pods = candidates.iter().filter(|p| is_pod_ready(p)).count();

        let selected = match select_pods(target.pod_selector.mode, candidates) {
            Ok(pods) => pods,
            Err(e) => return target_failed(target, ready_pods, e, reporter),
        };

        reporter.target_header(target, ready_pods, selected.len());

        let mut runs = stream::iter(selected.iter().map(|pod| self.run_pod(pod, &target.tests)))
            .buffered(self.settings.concurrency.max(1));

        let mut pods = Vec::with_capacity(selected.len());
        while let Some(outcome) = runs.next().await {
            reporter.pod(&outcome);
            pods.push(outcome);
        }

        TargetOutcome {
            name: target.name.clone(),
            ready_pods,
            pods,
            error: None,
        }
    }

    async fn run_pod(&self, pod: &Pod, tests: &[Test]) -> PodOutcome {
        let mut checks = Vec::with_capacity(tests.len());
        for test in tests {
            checks.push(self.run_check(pod, test).await);
        }
        PodOutcome {
            pod: PodRef::of(pod),
            checks,
        }
    }

    /// Run one check against one pod: launch, poll, interpret.
    #[instrument(skip_all, fields(pod = %PodRef::of(pod), check = %test.name))]
    pub async fn run_check(&self, pod: &Pod, test: &Test) -> CheckOutcome {
        let timeout = test.timeout.unwrap_or(self.settings.check_timeout);
        let image = self
            .launcher
            .image_for(test.probe_image.as_deref())
            .to_string();

        let verdict = match self.check_verdict(pod, test, timeout).await {
            Ok(verdict) => verdict,
            Err(e) => Verdict::Error(e),
        };

        match &verdict {
            Verdict::Passed => info!(
                target: "netcheck.runner.engine",
                endpoint = %test.endpoint,
                "Check passed"
            ),
            Verdict::Failed { exit_code } => warn!(
                target: "netcheck.runner.engine",
                endpoint = %test.endpoint,
                exit_code = exit_code,
                "Check failed"
            ),
            Verdict::Error(e) => warn!(
                target: "netcheck.runner.engine",
                endpoint = %test.endpoint,
                code = e.code(),
                error = %e,
                "Check errored"
            ),
        }

        CheckOutcome {
            test: test.clone(),
            timeout,
            image,
            verdict,
        }
    }

    async fn check_verdict(
        &self,
        pod: &Pod,
        test: &Test,
        timeout: Duration,
    ) -> Result<Verdict, RunnerError> {
        if self.cancel.is_cancelled() {
            return Err(RunnerError::Cancelled);
        }

        validate_endpoint(test.kind, &test.endpoint)?;

        let (_, handle) = self
            .launcher
            .launch(
                self.client.as_ref(),
                pod,
                test.probe_image.as_deref(),
                probe_args(test, timeout),
            )
            .await?;

        let poll = PollSettings {
            interval: self.settings.poll_interval,
            timeout: poll_timeout_for(timeout, self.settings.poll_timeout_floor),
        };
        let exit_code = poll_exit_code(self.client.as_ref(), &handle, poll, &self.cancel).await?;

        Ok(interpret_exit_code(test.kind, test.expect_fail, exit_code))
    }
}

fn target_failed(
    target: &TestTarget,
    ready_pods: usize,
    error: RunnerError,
    reporter: &mut Reporter,
) -> TargetOutcome {
    warn!(
        target: "netcheck.runner.engine",
        name = %target.name,
        code = error.code(),
        error = %error,
        "Test target failed"
    );
    reporter.target_error(target, &error);

    TargetOutcome {
        name: target.name.clone(),
        ready_pods,
        pods: Vec::new(),
        error: Some(error),
    }
}
