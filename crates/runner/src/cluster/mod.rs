//! Cluster API seam.
//!
//! The runner needs exactly three cluster operations: list pods, get a pod and
//! patch a pod's ephemeral containers. They are expressed as the
//! [`ClusterClient`] trait so the engine can run against the kube-backed
//! [`KubeClusterClient`] or the in-memory [`mock::MockClusterClient`].

pub mod kube_client;
pub mod mock;

pub use kube_client::KubeClusterClient;

use k8s_openapi::api::core::v1::Pod;
use std::fmt;
use thiserror::Error;

/// Errors reported by a cluster client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClusterError {
    #[error("Kubernetes client configuration failed: {0}")]
    Config(String),

    #[error("Kubernetes API error {code} ({reason}): {message}")]
    Api {
        code: u16,
        reason: String,
        message: String,
    },

    #[error("Ephemeral containers are not supported by this cluster: {0}")]
    EphemeralContainersUnsupported(String),

    #[error("Encoding request failed: {0}")]
    Encoding(String),

    #[error("Kubernetes request failed: {0}")]
    Request(String),
}

/// Namespace and name of a pod.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
}

impl PodRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Identity of a fetched pod. Missing metadata yields empty strings.
    pub fn of(pod: &Pod) -> Self {
        Self {
            namespace: pod.metadata.namespace.clone().unwrap_or_default(),
            name: pod.metadata.name.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for PodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Cluster operations required by the runner.
#[async_trait::async_trait]
pub trait ClusterClient: Send + Sync {
    /// List pods in `namespace` (all namespaces when empty) filtered by
    /// label and field selectors. Empty selectors match everything.
    async fn list_pods(
        &self,
        namespace: &str,
        labels: &str,
        fields: &str,
    ) -> Result<Vec<Pod>, ClusterError>;

    /// Fetch the current state of a single pod.
    async fn get_pod(&self, pod: &PodRef) -> Result<Pod, ClusterError>;

    /// Apply a strategic merge patch to the pod's `ephemeralcontainers`
    /// subresource and return the patched pod.
    async fn patch_ephemeral_containers(
        &self,
        pod: &PodRef,
        patch: &serde_json::Value,
    ) -> Result<Pod, ClusterError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn test_pod_ref_of_pod() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("web-0".to_string()),
                namespace: Some("shop".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let pod_ref = PodRef::of(&pod);
        assert_eq!(pod_ref, PodRef::new("shop", "web-0"));
        assert_eq!(pod_ref.to_string(), "shop/web-0");
    }

    #[test]
    fn test_pod_ref_of_pod_without_metadata() {
        assert_eq!(PodRef::of(&Pod::default()), PodRef::new("", ""));
    }
}
