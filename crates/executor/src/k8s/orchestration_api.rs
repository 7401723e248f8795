//! The pod operations the cluster context performs directly against the API server.

use std::collections::BTreeMap;

use error_stack::Report;
use k8s_openapi::api::core::v1::Pod;
use kube::api::DeleteParams;
use kube::api::Patch;
use kube::api::PatchParams;
use kube::api::PostParams;
use kube::Api;
use kube::Client;
use serde_json::json;

use crate::k8s::KubernetesError;
use crate::k8s::PodKey;

/// Write access to pods on the orchestration API.
///
/// Implementations must report a delete of an absent pod as
/// [`KubernetesError::PodNotFound`] so callers can tell it apart from other failures.
#[async_trait::async_trait]
pub trait OrchestrationApi: Send + Sync {
    /// Create the pod and return the object as stored by the API server.
    async fn create_pod(&self, pod: &Pod) -> Result<Pod, Report<KubernetesError>>;

    /// Delete the pod identified by `key`.
    async fn delete_pod(&self, key: &PodKey) -> Result<(), Report<KubernetesError>>;

    /// Merge the given annotations into the pod's metadata.
    async fn patch_pod_annotations(
        &self,
        key: &PodKey,
        annotations: &BTreeMap<String, String>,
    ) -> Result<Pod, Report<KubernetesError>>;
}

/// [`OrchestrationApi`] backed by a `kube` client.
pub struct KubeOrchestrationApi {
    client: Client,
}

impl KubeOrchestrationApi {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn is_not_found(error: &kube::Error) -> bool {
    matches!(error, kube::Error::Api(response) if response.code == 404)
}

#[async_trait::async_trait]
impl OrchestrationApi for KubeOrchestrationApi {
    async fn create_pod(&self, pod: &Pod) -> Result<Pod, Report<KubernetesError>> {
        let key = PodKey::from_pod(pod);
        self.pods(&key.namespace)
            .create(&PostParams::default(), pod)
            .await
            .map_err(|e| {
                Report::new(KubernetesError::CreateFailed {
                    pod: key,
                    message: e.to_string(),
                })
            })
    }

    async fn delete_pod(&self, key: &PodKey) -> Result<(), Report<KubernetesError>> {
        match self
            .pods(&key.namespace)
            .delete(&key.name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if is_not_found(&e) => Err(Report::new(KubernetesError::PodNotFound {
                pod_name: key.name.clone(),
                namespace: key.namespace.clone(),
            })),
            Err(e) => Err(Report::new(KubernetesError::DeleteFailed {
                pod: key.clone(),
                message: e.to_string(),
            })),
        }
    }

    async fn patch_pod_annotations(
        &self,
        key: &PodKey,
        annotations: &BTreeMap<String, String>,
    ) -> Result<Pod, Report<KubernetesError>> {
        let patch = json!({ "metadata": { "annotations": annotations } });
        self.pods(&key.namespace)
            .patch(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| {
                Report::new(KubernetesError::PatchFailed {
                    pod: key.clone(),
                    message: e.to_string(),
                })
            })
    }
}
