//! Probe container completion polling.
//!
//! The pod is re-fetched on every tick and its ephemeral container statuses
//! scanned for the probe container. A missing status entry means the
//! container has not been observed yet and is not an error until the
//! deadline. Both the wait between ticks and each in-flight fetch are raced
//! against the deadline and the cancellation token.

use crate::cluster::ClusterClient;
use crate::errors::RunnerError;
use crate::launcher::EphemeralProbeHandle;
use k8s_openapi::api::core::v1::Pod;
use std::time::Duration;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// Observed state of a probe container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeContainerState {
    /// Status entry present but no state reported yet.
    Unknown,
    Waiting,
    Running,
    Terminated(i32),
}

// Upper bound for any wait the poller schedules, so adding it to an
// `Instant` cannot overflow.
const MAX_WAIT: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Polling cadence and deadline for one probe container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

/// State of the named ephemeral container, or `None` when the pod has no
/// status entry for it.
pub fn ephemeral_container_state(pod: &Pod, container_name: &str) -> Option<ProbeContainerState> {
    let status = pod
        .status
        .as_ref()?
        .ephemeral_container_statuses
        .as_ref()?
        .iter()
        .find(|status| status.name == container_name)?;

    let state = match status.state.as_ref() {
        Some(state) => {
            if let Some(terminated) = &state.terminated {
                ProbeContainerState::Terminated(terminated.exit_code)
            } else if state.running.is_some() {
                ProbeContainerState::Running
            } else if state.waiting.is_some() {
                ProbeContainerState::Waiting
            } else {
                ProbeContainerState::Unknown
            }
        }
        None => ProbeContainerState::Unknown,
    };

    Some(state)
}

/// Wait for the probe container to terminate and return its exit code.
///
/// The first fetch happens one interval after the call.
///
/// # Errors
///
/// - `RunnerError::Cancelled` - `cancel` fired before termination
/// - `RunnerError::ContainerNotFound` - the deadline passed and the container
///   never appeared in the pod status
/// - `RunnerError::PollTimeout` - the deadline passed after the container
///   appeared but before it terminated
/// - `RunnerError::Cluster` - fetching the pod failed
#[instrument(skip_all, fields(pod = %handle.pod, container = %handle.container_name))]
pub async fn poll_exit_code(
    client: &dyn ClusterClient,
    handle: &EphemeralProbeHandle,
    settings: PollSettings,
    cancel: &CancellationToken,
) -> Result<i32, RunnerError> {
    let start = Instant::now();
    let deadline = instant_after(start, settings.timeout);
    let interval = settings.interval.min(MAX_WAIT);
    let mut ticker = interval_at(instant_after(start, interval), interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut observed = false;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RunnerError::Cancelled),
            () = sleep_until(deadline) => return Err(deadline_error(handle, settings, observed)),
            _ = ticker.tick() => {}
        }

        let pod = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(RunnerError::Cancelled),
            () = sleep_until(deadline) => return Err(deadline_error(handle, settings, observed)),
            result = client.get_pod(&handle.pod) => result?,
        };

        match ephemeral_container_state(&pod, &handle.container_name) {
            Some(ProbeContainerState::Terminated(exit_code)) => {
                debug!(
                    target: "netcheck.runner.poller",
                    exit_code = exit_code,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Probe container terminated"
                );
                return Ok(exit_code);
            }
            Some(state) => {
                observed = true;
                debug!(
                    target: "netcheck.runner.poller",
                    state = ?state,
                    "Probe container not terminated yet"
                );
            }
            None => {
                debug!(
                    target: "netcheck.runner.poller",
                    "Probe container not observed yet"
                );
            }
        }
    }
}

fn instant_after(start: Instant, wait: Duration) -> Instant {
    let wait = wait.min(MAX_WAIT);
    start.checked_add(wait).unwrap_or(start)
}

fn deadline_error(
    handle: &EphemeralProbeHandle,
    settings: PollSettings,
    observed: bool,
) -> RunnerError {
    warn!(
        target: "netcheck.runner.poller",
        observed = observed,
        timeout_ms = settings.timeout.as_millis() as u64,
        "Probe container did not terminate before the deadline"
    );

    if observed {
        RunnerError::PollTimeout {
            pod: handle.pod.to_string(),
            container: handle.container_name.clone(),
            timeout: settings.timeout,
        }
    } else {
        RunnerError::ContainerNotFound {
            pod: handle.pod.to_string(),
            container: handle.container_name.clone(),
        }
    }
}
