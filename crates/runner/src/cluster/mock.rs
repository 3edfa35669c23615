//! In-memory cluster client for tests.
//!
//! Pods are stored as full `Pod` objects. Each ephemeral container patched in
//! gets a script of states that successive `get_pod` calls step through; the
//! last state repeats once the script is exhausted.

use super::{ClusterClient, ClusterError, PodRef};
use k8s_openapi::api::core::v1::{
    ContainerState, ContainerStateRunning, ContainerStateTerminated, ContainerStateWaiting,
    ContainerStatus, EphemeralContainer, Pod, PodCondition, PodSpec, PodStatus,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Container state reported by the mock for one `get_pod` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptedState {
    /// No status entry for the container yet.
    Absent,
    Waiting,
    Running,
    Terminated(i32),
}

struct BoundScript {
    states: Vec<ScriptedState>,
    cursor: usize,
}

impl BoundScript {
    fn next(&mut self) -> ScriptedState {
        let state = self
            .states
            .get(self.cursor)
            .or_else(|| self.states.last())
            .copied()
            .unwrap_or(ScriptedState::Terminated(0));
        if self.cursor < self.states.len() {
            self.cursor += 1;
        }
        state
    }
}

#[derive(Default)]
struct Inner {
    pods: Vec<Pod>,
    pending_scripts: HashMap<PodRef, VecDeque<Vec<ScriptedState>>>,
    bound: HashMap<PodRef, Vec<(String, BoundScript)>>,
    patches: Vec<(PodRef, serde_json::Value)>,
    list_error: Option<ClusterError>,
    get_error: Option<ClusterError>,
    patch_error: Option<ClusterError>,
    patch_errors_by_pod: HashMap<String, ClusterError>,
    get_delay: Option<Duration>,
}

/// Mock cluster client for unit and integration testing.
#[derive(Default)]
pub struct MockClusterClient {
    inner: Mutex<Inner>,
    list_calls: AtomicUsize,
    get_calls: AtomicUsize,
}

impl MockClusterClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock holding the given pods.
    pub fn with_pods(pods: impl IntoIterator<Item = Pod>) -> Self {
        let mock = Self::new();
        mock.lock().pods.extend(pods);
        mock
    }

    /// Add a pod.
    #[must_use]
    pub fn with_pod(self, pod: Pod) -> Self {
        self.lock().pods.push(pod);
        self
    }

    /// Queue a state script for the next probe container launched into `pod`.
    /// Containers launched with no queued script terminate with exit code 0.
    #[must_use]
    pub fn with_container_script(self, pod: &PodRef, states: Vec<ScriptedState>) -> Self {
        self.lock()
            .pending_scripts
            .entry(pod.clone())
            .or_default()
            .push_back(states);
        self
    }

    /// Make every `list_pods` call fail.
    #[must_use]
    pub fn failing_list(self, error: ClusterError) -> Self {
        self.lock().list_error = Some(error);
        self
    }

    /// Make every `get_pod` call fail.
    #[must_use]
    pub fn failing_get(self, error: ClusterError) -> Self {
        self.lock().get_error = Some(error);
        self
    }

    /// Make every patch fail.
    #[must_use]
    pub fn failing_patch(self, error: ClusterError) -> Self {
        self.lock().patch_error = Some(error);
        self
    }

    /// Make patches against the named pod fail.
    #[must_use]
    pub fn failing_patch_for(self, pod_name: &str, error: ClusterError) -> Self {
        self.lock()
            .patch_errors_by_pod
            .insert(pod_name.to_string(), error);
        self
    }

    /// Delay every `get_pod` response.
    #[must_use]
    pub fn with_get_delay(self, delay: Duration) -> Self {
        self.lock().get_delay = Some(delay);
        self
    }

    /// Patches received so far, in order.
    pub fn patches(&self) -> Vec<(PodRef, serde_json::Value)> {
        self.lock().patches.clone()
    }

    /// Ephemeral containers present in the stored spec of `pod`.
    pub fn ephemeral_containers(&self, pod: &PodRef) -> Vec<EphemeralContainer> {
        self.lock()
            .pods
            .iter()
            .find(|p| PodRef::of(p) == *pod)
            .and_then(|p| p.spec.as_ref())
            .and_then(|spec| spec.ephemeral_containers.clone())
            .unwrap_or_default()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait::async_trait]
impl ClusterClient for MockClusterClient {
    async fn list_pods(
        &self,
        namespace: &str,
        labels: &str,
        fields: &str,
    ) -> Result<Vec<Pod>, ClusterError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let inner = self.lock();
        if let Some(error) = &inner.list_error {
            return Err(error.clone());
        }

        let label_terms = selector_terms(labels);
        let field_terms = selector_terms(fields);

        Ok(inner
            .pods
            .iter()
            .filter(|pod| {
                namespace.is_empty() || pod.metadata.namespace.as_deref() == Some(namespace)
            })
            .filter(|pod| matches_labels(pod, &label_terms))
            .filter(|pod| matches_fields(pod, &field_terms))
            .cloned()
            .collect())
    }

    async fn get_pod(&self, pod_ref: &PodRef) -> Result<Pod, ClusterError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.lock().get_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.lock();
        if let Some(error) = &inner.get_error {
            return Err(error.clone());
        }

        let mut pod = inner
            .pods
            .iter()
            .find(|p| PodRef::of(p) == *pod_ref)
            .cloned()
            .ok_or_else(|| not_found(&pod_ref.name))?;

        let statuses: Vec<ContainerStatus> = inner
            .bound
            .get_mut(pod_ref)
            .map(|scripts| {
                scripts
                    .iter_mut()
                    .filter_map(|(name, script)| container_status(name, script.next()))
                    .collect()
            })
            .unwrap_or_default();

        if !statuses.is_empty() {
            pod.status
                .get_or_insert_with(PodStatus::default)
                .ephemeral_container_statuses = Some(statuses);
        }

        Ok(pod)
    }

    async fn patch_ephemeral_containers(
        &self,
        pod_ref: &PodRef,
        patch: &serde_json::Value,
    ) -> Result<Pod, ClusterError> {
        let mut inner = self.lock();
        inner.patches.push((pod_ref.clone(), patch.clone()));

        if let Some(error) = &inner.patch_error {
            return Err(error.clone());
        }
        if let Some(error) = inner.patch_errors_by_pod.get(&pod_ref.name) {
            return Err(error.clone());
        }

        let added: Vec<EphemeralContainer> = patch
            .get("spec")
            .and_then(|spec| spec.get("ephemeralContainers"))
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| ClusterError::Encoding(e.to_string()))?
            .unwrap_or_default();

        let pod = inner
            .pods
            .iter_mut()
            .find(|p| PodRef::of(p) == *pod_ref)
            .ok_or_else(|| not_found(&pod_ref.name))?;

        let spec = pod.spec.get_or_insert_with(PodSpec::default);
        let containers = spec.ephemeral_containers.get_or_insert_with(Vec::new);
        let new_names: Vec<String> = added
            .iter()
            .filter(|c| !containers.iter().any(|existing| existing.name == c.name))
            .map(|c| c.name.clone())
            .collect();
        for container in added {
            if new_names.contains(&container.name) {
                containers.push(container);
            }
        }
        let patched = pod.clone();

        for name in new_names {
            let states = inner
                .pending_scripts
                .get_mut(pod_ref)
                .and_then(VecDeque::pop_front)
                .unwrap_or_else(|| vec![ScriptedState::Terminated(0)]);
            inner
                .bound
                .entry(pod_ref.clone())
                .or_default()
                .push((name, BoundScript { states, cursor: 0 }));
        }

        Ok(patched)
    }
}

fn not_found(pod_name: &str) -> ClusterError {
    ClusterError::Api {
        code: 404,
        reason: "NotFound".to_string(),
        message: format!("pods \"{pod_name}\" not found"),
    }
}

fn selector_terms(selector: &str) -> Vec<(&str, &str)> {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .filter_map(|term| term.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim_start_matches('=').trim()))
        .collect()
}

fn matches_labels(pod: &Pod, terms: &[(&str, &str)]) -> bool {
    terms.iter().all(|(key, value)| {
        pod.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(*key))
            .is_some_and(|v| v == value)
    })
}

// Only the fields tests filter on are understood; unknown keys match.
fn matches_fields(pod: &Pod, terms: &[(&str, &str)]) -> bool {
    terms.iter().all(|(key, value)| match *key {
        "metadata.name" => pod.metadata.name.as_deref() == Some(*value),
        "metadata.namespace" => pod.metadata.namespace.as_deref() == Some(*value),
        "status.phase" => {
            pod.status.as_ref().and_then(|s| s.phase.as_deref()) == Some(*value)
        }
        "spec.nodeName" => {
            pod.spec.as_ref().and_then(|s| s.node_name.as_deref()) == Some(*value)
        }
        _ => true,
    })
}

fn container_status(name: &str, state: ScriptedState) -> Option<ContainerStatus> {
    let state = match state {
        ScriptedState::Absent => return None,
        ScriptedState::Waiting => ContainerState {
            waiting: Some(ContainerStateWaiting {
                reason: Some("ContainerCreating".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        },
        ScriptedState::Running => ContainerState {
            running: Some(ContainerStateRunning::default()),
            ..Default::default()
        },
        ScriptedState::Terminated(exit_code) => ContainerState {
            terminated: Some(ContainerStateTerminated {
                exit_code,
                ..Default::default()
            }),
            ..Default::default()
        },
    };

    Some(ContainerStatus {
        name: name.to_string(),
        state: Some(state),
        ..Default::default()
    })
}

/// Pod fixture with explicit labels and `(type, status)` conditions.
pub fn pod_with_conditions(
    namespace: &str,
    name: &str,
    labels: &[(&str, &str)],
    conditions: &[(&str, &str)],
) -> Pod {
    let labels: BTreeMap<String, String> = labels
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();

    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(PodSpec::default()),
        status: Some(PodStatus {
            phase: Some("Running".to_string()),
            conditions: Some(
                conditions
                    .iter()
                    .map(|(type_, status)| PodCondition {
                        type_: (*type_).to_string(),
                        status: (*status).to_string(),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }),
    }
}

/// Pod fixture reporting `Ready=True`.
pub fn ready_pod(namespace: &str, name: &str, labels: &[(&str, &str)]) -> Pod {
    pod_with_conditions(namespace, name, labels, &[("Ready", "True")])
}

/// Pod fixture reporting `Ready=False`.
pub fn unready_pod(namespace: &str, name: &str, labels: &[(&str, &str)]) -> Pod {
    pod_with_conditions(namespace, name, labels, &[("Ready", "False")])
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn state_of(pod: &Pod, container: &str) -> Option<ContainerState> {
        pod.status
            .as_ref()?
            .ephemeral_container_statuses
            .as_ref()?
            .iter()
            .find(|s| s.name == container)?
            .state
            .clone()
    }

    fn probe_patch(name: &str) -> serde_json::Value {
        json!({"spec": {"ephemeralContainers": [{"name": name, "image": "probe:latest"}]}})
    }

    #[tokio::test]
    async fn test_list_filters_namespace_and_labels() {
        let mock = MockClusterClient::with_pods([
            ready_pod("shop", "web-0", &[("app", "web")]),
            ready_pod("shop", "db-0", &[("app", "db")]),
            ready_pod("other", "web-1", &[("app", "web")]),
        ]);

        let pods = mock.list_pods("shop", "app=web", "").await.unwrap();
        assert_eq!(pods.len(), 1);
        assert_eq!(
            pods.first().and_then(|p| p.metadata.name.as_deref()),
            Some("web-0")
        );

        let everywhere = mock.list_pods("", "app=web", "").await.unwrap();
        assert_eq!(everywhere.len(), 2);

        let by_field = mock
            .list_pods("shop", "", "metadata.name=db-0")
            .await
            .unwrap();
        assert_eq!(by_field.len(), 1);
        assert_eq!(mock.list_calls(), 3);
    }

    #[tokio::test]
    async fn test_patch_binds_script_and_steps_states() {
        let pod_ref = PodRef::new("shop", "web-0");
        let mock = MockClusterClient::with_pods([ready_pod("shop", "web-0", &[])])
            .with_container_script(
                &pod_ref,
                vec![
                    ScriptedState::Absent,
                    ScriptedState::Waiting,
                    ScriptedState::Terminated(3),
                ],
            );

        mock.patch_ephemeral_containers(&pod_ref, &probe_patch("probe-a"))
            .await
            .unwrap();
        assert_eq!(mock.ephemeral_containers(&pod_ref).len(), 1);

        let first = mock.get_pod(&pod_ref).await.unwrap();
        assert!(state_of(&first, "probe-a").is_none());

        let second = mock.get_pod(&pod_ref).await.unwrap();
        assert!(state_of(&second, "probe-a").unwrap().waiting.is_some());

        for _ in 0..2 {
            let pod = mock.get_pod(&pod_ref).await.unwrap();
            let terminated = state_of(&pod, "probe-a").unwrap().terminated.unwrap();
            assert_eq!(terminated.exit_code, 3);
        }
    }

    #[tokio::test]
    async fn test_unscripted_container_succeeds() {
        let pod_ref = PodRef::new("shop", "web-0");
        let mock = MockClusterClient::with_pods([ready_pod("shop", "web-0", &[])]);

        mock.patch_ephemeral_containers(&pod_ref, &probe_patch("probe-a"))
            .await
            .unwrap();
        let pod = mock.get_pod(&pod_ref).await.unwrap();
        let terminated = state_of(&pod, "probe-a").unwrap().terminated.unwrap();
        assert_eq!(terminated.exit_code, 0);
    }

    #[tokio::test]
    async fn test_failures_are_injected() {
        let pod_ref = PodRef::new("shop", "web-0");
        let mock = MockClusterClient::with_pods([ready_pod("shop", "web-0", &[])])
            .failing_patch_for(
                "web-0",
                ClusterError::EphemeralContainersUnsupported("no subresource".to_string()),
            );

        let err = mock
            .patch_ephemeral_containers(&pod_ref, &probe_patch("probe-a"))
            .await
            .unwrap_err();
        assert!(matches!(err, ClusterError::EphemeralContainersUnsupported(_)));
        assert_eq!(mock.patches().len(), 1);
        assert!(mock.ephemeral_containers(&pod_ref).is_empty());

        let missing = mock.get_pod(&PodRef::new("shop", "nope")).await.unwrap_err();
        assert!(matches!(missing, ClusterError::Api { code: 404, .. }));
    }
}
