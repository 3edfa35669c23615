//! Kubernetes-backed cluster client.
//!
//! Connection resolution: an explicit kubeconfig context wins; otherwise the
//! in-cluster service account is tried first, then the default kubeconfig.

use super::{ClusterClient, ClusterError, PodRef};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams, Patch, PatchParams};
use kube::config::KubeConfigOptions;
use kube::{Client, Config};
use tracing::{debug, instrument};

/// Cluster client talking to a real API server.
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl KubeClusterClient {
    /// Build a client for `context`, or for the ambient cluster when `None`.
    ///
    /// # Errors
    ///
    /// - `ClusterError::Config` - no usable in-cluster or kubeconfig configuration
    pub async fn connect(context: Option<&str>) -> Result<Self, ClusterError> {
        let config = match context.filter(|c| !c.is_empty()) {
            Some(context) => Self::kubeconfig(Some(context.to_string())).await?,
            None => match Config::incluster() {
                Ok(config) => config,
                Err(e) => {
                    debug!(
                        target: "netcheck.runner.cluster",
                        error = %e,
                        "In-cluster configuration unavailable, falling back to kubeconfig"
                    );
                    Self::kubeconfig(None).await?
                }
            },
        };

        let client = Client::try_from(config)
            .map_err(|e| ClusterError::Config(format!("creating Kubernetes client: {e}")))?;

        Ok(Self { client })
    }

    /// Wrap an already constructed client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    async fn kubeconfig(context: Option<String>) -> Result<Config, ClusterError> {
        let options = KubeConfigOptions {
            context,
            ..Default::default()
        };
        Config::from_kubeconfig(&options)
            .await
            .map_err(|e| ClusterError::Config(format!("loading kubeconfig: {e}")))
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        if namespace.is_empty() {
            Api::all(self.client.clone())
        } else {
            Api::namespaced(self.client.clone(), namespace)
        }
    }
}

impl From<kube::Error> for ClusterError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(response) => ClusterError::Api {
                code: response.code,
                reason: response.reason,
                message: response.message,
            },
            other => ClusterError::Request(other.to_string()),
        }
    }
}

/// Reclassify a patch failure.
///
/// The API server answers 404 when the `ephemeralcontainers` subresource is
/// missing. Unlike the 404 for a missing pod, that message does not name the
/// pod.
fn classify_patch_error(err: ClusterError, pod_name: &str) -> ClusterError {
    match err {
        ClusterError::Api { code: 404, message, .. } if !message.contains(pod_name) => {
            ClusterError::EphemeralContainersUnsupported(message)
        }
        other => other,
    }
}

#[async_trait::async_trait]
impl ClusterClient for KubeClusterClient {
    #[instrument(skip(self), fields(namespace = %namespace))]
    async fn list_pods(
        &self,
        namespace: &str,
        labels: &str,
        fields: &str,
    ) -> Result<Vec<Pod>, ClusterError> {
        let mut params = ListParams::default();
        if !labels.is_empty() {
            params = params.labels(labels);
        }
        if !fields.is_empty() {
            params = params.fields(fields);
        }

        let list = self.pods(namespace).list(&params).await?;
        Ok(list.items)
    }

    #[instrument(skip(self), fields(pod = %pod))]
    async fn get_pod(&self, pod: &PodRef) -> Result<Pod, ClusterError> {
        Ok(self.pods(&pod.namespace).get(&pod.name).await?)
    }

    #[instrument(skip(self, patch), fields(pod = %pod))]
    async fn patch_ephemeral_containers(
        &self,
        pod: &PodRef,
        patch: &serde_json::Value,
    ) -> Result<Pod, ClusterError> {
        self.pods(&pod.namespace)
            .patch_ephemeral_containers(&pod.name, &PatchParams::default(), &Patch::Strategic(patch))
            .await
            .map_err(|e| classify_patch_error(e.into(), &pod.name))
    }
}
