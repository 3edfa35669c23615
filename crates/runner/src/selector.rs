//! Pod selection.
//!
//! Candidates are fetched by namespace and label/field query, filtered to
//! pods whose `Ready` condition is exactly `True`, then narrowed by the
//! target's selection mode.

use crate::cluster::ClusterClient;
use crate::errors::RunnerError;
use crate::plan::{PodSelector, SelectionMode};
use k8s_openapi::api::core::v1::Pod;
use rand::Rng;
use tracing::{debug, instrument};

/// Whether the pod's first `Ready` condition has status `True`.
///
/// A pod without a `Ready` condition is not ready.
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|status| status.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == "Ready"))
        .is_some_and(|ready| ready.status == "True")
}

/// Narrow candidates to the ready pods the mode selects.
///
/// # Errors
///
/// - `RunnerError::InvalidSelectionMode` - no mode was given
/// - `RunnerError::NoReadyPods` - none of the candidates is ready
pub fn select_pods(mode: Option<SelectionMode>, pods: Vec<Pod>) -> Result<Vec<Pod>, RunnerError> {
    select_pods_with_rng(mode, pods, &mut rand::thread_rng())
}

/// [`select_pods`] with an explicit random source.
pub fn select_pods_with_rng<R: Rng + ?Sized>(
    mode: Option<SelectionMode>,
    pods: Vec<Pod>,
    rng: &mut R,
) -> Result<Vec<Pod>, RunnerError> {
    let mode = mode.ok_or_else(|| {
        RunnerError::InvalidSelectionMode("mode must be one of: all, random".to_string())
    })?;

    let mut ready: Vec<Pod> = pods.into_iter().filter(is_pod_ready).collect();
    if ready.is_empty() {
        return Err(RunnerError::NoReadyPods);
    }

    match mode {
        SelectionMode::All => Ok(ready),
        SelectionMode::Random => {
            let index = rng.gen_range(0..ready.len());
            Ok(vec![ready.swap_remove(index)])
        }
    }
}

/// List the pods a selector matches in `namespace`.
///
/// # Errors
///
/// - `RunnerError::NoPodsFound` - the query matched nothing
/// - `RunnerError::Cluster` - the list call failed
#[instrument(skip(client, selector), fields(namespace = %namespace, selector = %selector))]
pub async fn find_pods(
    client: &dyn ClusterClient,
    namespace: &str,
    selector: &PodSelector,
) -> Result<Vec<Pod>, RunnerError> {
    let pods = client
        .list_pods(namespace, &selector.labels, &selector.fields)
        .await?;

    if pods.is_empty() {
        return Err(RunnerError::NoPodsFound {
            namespace: namespace.to_string(),
            selector: query_summary(selector),
        });
    }

    debug!(
        target: "netcheck.runner.selector",
        count = pods.len(),
        "Found candidate pods"
    );

    Ok(pods)
}

fn query_summary(selector: &PodSelector) -> String {
    match (selector.labels.is_empty(), selector.fields.is_empty()) {
        (true, true) => "any labels and fields".to_string(),
        (false, true) => format!("labels: {}", selector.labels),
        (true, false) => format!("fields: {}", selector.fields),
        (false, false) => format!("labels: {}, fields: {}", selector.labels, selector.fields),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::cluster::mock::{pod_with_conditions, ready_pod, unready_pod, MockClusterClient};
    use crate::cluster::ClusterError;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::{BTreeSet, HashMap};

    fn pod(conditions: &[(&str, &str)]) -> Pod {
        pod_with_conditions("default", "p", &[], conditions)
    }

    fn names(pods: &[Pod]) -> BTreeSet<String> {
        pods.iter()
            .filter_map(|p| p.metadata.name.clone())
            .collect()
    }

    fn mixed_pods() -> Vec<Pod> {
        vec![
            ready_pod("default", "pod-000", &[]),
            unready_pod("default", "pod-001", &[]),
            ready_pod("default", "pod-002", &[]),
            pod_with_conditions("default", "pod-003", &[], &[("ContainersReady", "True")]),
            ready_pod("default", "pod-004", &[]),
        ]
    }

    #[test]
    fn test_is_pod_ready_true() {
        let cases: [&[(&str, &str)]; 4] = [
            &[("Ready", "True")],
            &[("ContainersReady", "False"), ("Ready", "True")],
            &[("Ready", "True"), ("ContainersReady", "False")],
            &[("Initialized", "Unknown"), ("Ready", "True")],
        ];
        for conditions in cases {
            assert!(is_pod_ready(&pod(conditions)), "{conditions:?}");
        }
    }

    #[test]
    fn test_is_pod_ready_false() {
        let cases: [&[(&str, &str)]; 8] = [
            &[("Ready", "False")],
            &[("Ready", "Unknown")],
            &[("ContainersReady", "True"), ("Ready", "False")],
            &[("Ready", "False"), ("ContainersReady", "True")],
            &[("Initialized", "True"), ("Ready", "False")],
            &[("ContainersReady", "True")],
            &[("Initialized", "True")],
            &[],
        ];
        for conditions in cases {
            assert!(!is_pod_ready(&pod(conditions)), "{conditions:?}");
        }
        assert!(!is_pod_ready(&Pod::default()));
    }

    #[test]
    fn test_all_mode_returns_ready_set() {
        let mut pods = mixed_pods();
        let selected = select_pods(Some(SelectionMode::All), pods.clone()).unwrap();
        let expected: BTreeSet<String> = ["pod-000", "pod-002", "pod-004"]
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(names(&selected), expected);

        pods.reverse();
        let reversed = select_pods(Some(SelectionMode::All), pods).unwrap();
        assert_eq!(names(&reversed), expected);
    }

    #[test]
    fn test_random_mode_returns_one_ready_member() {
        let ready = names(&select_pods(Some(SelectionMode::All), mixed_pods()).unwrap());
        for _ in 0..50 {
            let selected = select_pods(Some(SelectionMode::Random), mixed_pods()).unwrap();
            assert_eq!(selected.len(), 1);
            assert!(ready.is_superset(&names(&selected)));
        }
    }

    #[test]
    fn test_random_mode_is_uniform() {
        let pods: Vec<Pod> = (0..4)
            .map(|i| ready_pod("default", &format!("pod-{i:03}"), &[]))
            .collect();
        let mut rng = StdRng::seed_from_u64(7);
        let trials = 4000;

        let mut counts: HashMap<String, usize> = HashMap::new();
        for _ in 0..trials {
            let selected =
                select_pods_with_rng(Some(SelectionMode::Random), pods.clone(), &mut rng).unwrap();
            let name = selected[0].metadata.name.clone().unwrap();
            *counts.entry(name).or_default() += 1;
        }

        assert_eq!(counts.len(), 4);
        for (name, count) in counts {
            assert!(
                (800..=1200).contains(&count),
                "{name} selected {count} times out of {trials}"
            );
        }
    }

    #[test]
    fn test_no_ready_pods() {
        let pods = vec![
            unready_pod("default", "a", &[]),
            unready_pod("default", "b", &[]),
        ];
        for mode in [SelectionMode::All, SelectionMode::Random] {
            let result = select_pods(Some(mode), pods.clone());
            assert!(matches!(result, Err(RunnerError::NoReadyPods)));
        }
        assert!(matches!(
            select_pods(Some(SelectionMode::All), Vec::new()),
            Err(RunnerError::NoReadyPods)
        ));
    }

    #[test]
    fn test_missing_mode_is_invalid() {
        let result = select_pods(None, mixed_pods());
        assert!(matches!(result, Err(RunnerError::InvalidSelectionMode(_))));
    }

    #[tokio::test]
    async fn test_find_pods_no_match() {
        let client = MockClusterClient::with_pods([ready_pod("shop", "web-0", &[("app", "web")])]);
        let selector = PodSelector {
            mode: Some(SelectionMode::All),
            labels: "app=db".to_string(),
            fields: String::new(),
        };

        let err = find_pods(&client, "shop", &selector).await.unwrap_err();
        match err {
            RunnerError::NoPodsFound {
                namespace,
                selector,
            } => {
                assert_eq!(namespace, "shop");
                assert_eq!(selector, "labels: app=db");
            }
            other => panic!("Expected NoPodsFound, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_find_pods_returns_unready_candidates_too() {
        let client = MockClusterClient::with_pods([
            ready_pod("shop", "web-0", &[("app", "web")]),
            unready_pod("shop", "web-1", &[("app", "web")]),
        ]);
        let selector = PodSelector {
            mode: Some(SelectionMode::All),
            labels: "app=web".to_string(),
            fields: String::new(),
        };

        let pods = find_pods(&client, "shop", &selector).await.unwrap();
        assert_eq!(pods.len(), 2);
    }

    #[tokio::test]
    async fn test_find_pods_list_failure() {
        let client = MockClusterClient::new().failing_list(ClusterError::Request(
            "connection refused".to_string(),
        ));
        let err = find_pods(&client, "shop", &PodSelector::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RunnerError::Cluster(ClusterError::Request(_))));
    }
}
