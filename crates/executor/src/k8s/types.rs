use core::error::Error;
use std::fmt;

use k8s_openapi::api::core::v1::Pod;

/// Identity of a pod within the cluster.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct PodKey {
    pub namespace: String,
    pub name: String,
}

impl PodKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Pods without a namespace live in `default`, the same as the API server assumes.
    pub fn from_pod(pod: &Pod) -> Self {
        Self {
            namespace: pod
                .metadata
                .namespace
                .clone()
                .unwrap_or_else(|| "default".to_string()),
            name: pod.metadata.name.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for PodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Pod lifecycle events published by the watch view.
#[derive(Debug, Clone)]
pub enum PodEvent {
    /// A pod appeared in the view for the first time
    Added(Pod),
    /// A known pod changed
    Updated { old: Pod, new: Pod },
    /// A pod disappeared from the view
    Deleted(Pod),
}

impl PodEvent {
    /// The most recent state of the pod carried by this event.
    pub fn pod(&self) -> &Pod {
        match self {
            PodEvent::Added(pod) | PodEvent::Deleted(pod) => pod,
            PodEvent::Updated { new, .. } => new,
        }
    }
}

/// Errors that can occur during Kubernetes operations.
#[derive(Debug, derive_more::Display)]
pub enum KubernetesError {
    #[display("Failed to connect to Kubernetes API: {message}")]
    ConnectionFailed { message: String },
    #[display("Failed to watch {resource}: {message}")]
    WatchFailed { resource: String, message: String },
    #[display("Failed to create pod {pod}: {message}")]
    CreateFailed { pod: PodKey, message: String },
    #[display("Failed to delete pod {pod}: {message}")]
    DeleteFailed { pod: PodKey, message: String },
    #[display("Pod not found: {pod_name} in namespace {namespace}")]
    PodNotFound { pod_name: String, namespace: String },
    #[display("Failed to patch pod {pod}: {message}")]
    PatchFailed { pod: PodKey, message: String },
    #[display("Watch view for {resource} has not completed its initial sync")]
    NotSynced { resource: String },
}

impl Error for KubernetesError {}
