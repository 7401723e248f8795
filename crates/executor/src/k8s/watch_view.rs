//! Local, eventually consistent mirror of the cluster's pods and nodes.
//!
//! The view is fed by `kube` watch streams. Pod changes are diffed against the
//! previous state and published to registered [`PodEventHandler`]s after the
//! view itself has been updated, so handlers always observe a view that already
//! contains the change.

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use dashmap::DashMap;
use error_stack::Report;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::watcher;
use kube::runtime::watcher::Event;
use kube::Api;
use kube::Client;
use kube::Resource;
use serde::de::DeserializeOwned;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::k8s::KubernetesError;
use crate::k8s::PodEvent;
use crate::k8s::PodKey;

const WATCH_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Receives pod events from the [`WatchView`].
///
/// Handlers run on the watch task, so they must not block.
pub trait PodEventHandler: Send + Sync {
    fn on_pod_event(&self, event: &PodEvent);
}

impl<F> PodEventHandler for F
where
    F: Fn(&PodEvent) + Send + Sync,
{
    fn on_pod_event(&self, event: &PodEvent) {
        self(event)
    }
}

#[derive(Default)]
pub struct WatchView {
    pods: DashMap<PodKey, Pod>,
    nodes: DashMap<String, Node>,
    pods_synced: AtomicBool,
    nodes_synced: AtomicBool,
    handlers: RwLock<Vec<Arc<dyn PodEventHandler>>>,
}

impl WatchView {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_pod_event_handler(&self, handler: Arc<dyn PodEventHandler>) {
        self.handlers.write().expect("poisoned").push(handler);
    }

    /// True once both the pod and node watches delivered their initial listing.
    pub fn has_synced(&self) -> bool {
        self.pods_synced.load(Ordering::Acquire) && self.nodes_synced.load(Ordering::Acquire)
    }

    pub fn list_pods(&self) -> Result<Vec<Pod>, Report<KubernetesError>> {
        if !self.pods_synced.load(Ordering::Acquire) {
            return Err(Report::new(KubernetesError::NotSynced {
                resource: "pods".to_string(),
            }));
        }
        Ok(self.pods.iter().map(|entry| entry.value().clone()).collect())
    }

    pub fn contains_pod(&self, key: &PodKey) -> bool {
        self.pods.contains_key(key)
    }

    pub fn list_nodes(&self) -> Result<Vec<Node>, Report<KubernetesError>> {
        if !self.nodes_synced.load(Ordering::Acquire) {
            return Err(Report::new(KubernetesError::NotSynced {
                resource: "nodes".to_string(),
            }));
        }
        Ok(self.nodes.iter().map(|entry| entry.value().clone()).collect())
    }

    /// Apply one watch event to the pod view and notify handlers.
    pub fn apply_pod_event(&self, event: Event<Pod>) {
        let published = match event {
            Event::Applied(pod) => vec![self.upsert_pod(pod)],
            Event::Deleted(pod) => {
                let key = PodKey::from_pod(&pod);
                self.pods.remove(&key);
                vec![PodEvent::Deleted(pod)]
            }
            Event::Restarted(pods) => {
                let mut published = Vec::with_capacity(pods.len());
                let mut seen = HashSet::with_capacity(pods.len());
                for pod in pods {
                    seen.insert(PodKey::from_pod(&pod));
                    published.push(self.upsert_pod(pod));
                }

                let stale: Vec<PodKey> = self
                    .pods
                    .iter()
                    .filter(|entry| !seen.contains(entry.key()))
                    .map(|entry| entry.key().clone())
                    .collect();
                for key in stale {
                    if let Some((_, pod)) = self.pods.remove(&key) {
                        published.push(PodEvent::Deleted(pod));
                    }
                }

                if !self.pods_synced.swap(true, Ordering::AcqRel) {
                    info!(pods = self.pods.len(), "Pod watch view synced");
                }
                published
            }
        };

        self.publish(&published);
    }

    pub fn apply_node_event(&self, event: Event<Node>) {
        match event {
            Event::Applied(node) => {
                let name = node.metadata.name.clone().unwrap_or_default();
                self.nodes.insert(name, node);
            }
            Event::Deleted(node) => {
                let name = node.metadata.name.clone().unwrap_or_default();
                self.nodes.remove(&name);
            }
            Event::Restarted(nodes) => {
                self.nodes.clear();
                for node in nodes {
                    let name = node.metadata.name.clone().unwrap_or_default();
                    self.nodes.insert(name, node);
                }
                if !self.nodes_synced.swap(true, Ordering::AcqRel) {
                    info!(nodes = self.nodes.len(), "Node watch view synced");
                }
            }
        }
    }

    fn upsert_pod(&self, pod: Pod) -> PodEvent {
        let key = PodKey::from_pod(&pod);
        match self.pods.insert(key, pod.clone()) {
            Some(old) => PodEvent::Updated { old, new: pod },
            None => PodEvent::Added(pod),
        }
    }

    fn publish(&self, events: &[PodEvent]) {
        if events.is_empty() {
            return;
        }
        // Clone the handler list so no lock is held while handlers run.
        let handlers = self.handlers.read().expect("poisoned").clone();
        for event in events {
            for handler in &handlers {
                handler.on_pod_event(event);
            }
        }
    }

    /// Watch pods (in `namespace`, or cluster wide) and nodes until cancelled.
    ///
    /// Failed watches are restarted after a short delay; every restart begins
    /// with a fresh listing which resynchronises the view.
    #[tracing::instrument(skip(self, client, cancellation_token))]
    pub async fn run(
        &self,
        client: Client,
        namespace: Option<String>,
        cancellation_token: CancellationToken,
    ) {
        info!("Starting watch view");

        let pods: Api<Pod> = match &namespace {
            Some(ns) => Api::namespaced(client.clone(), ns),
            None => Api::all(client.clone()),
        };
        let nodes: Api<Node> = Api::all(client);

        tokio::join!(
            self.watch_until_cancelled(pods, "pods", &cancellation_token, Self::apply_pod_event),
            self.watch_until_cancelled(nodes, "nodes", &cancellation_token, Self::apply_node_event),
        );

        info!("Watch view stopped");
    }

    async fn watch_until_cancelled<K, F>(
        &self,
        api: Api<K>,
        resource: &'static str,
        cancellation_token: &CancellationToken,
        apply: F,
    ) where
        K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
        F: Fn(&Self, Event<K>),
    {
        loop {
            select! {
                _ = cancellation_token.cancelled() => {
                    info!(resource, "Watch shutdown requested");
                    break;
                }
                result = self.watch(api.clone(), resource, &apply) => {
                    match result {
                        Ok(()) => {
                            warn!(resource, "Watch stream ended unexpectedly, restarting...");
                        }
                        Err(e) => {
                            error!(resource, "Watch failed: {e:?}");
                            tokio::time::sleep(WATCH_RETRY_DELAY).await;
                        }
                    }
                }
            }
        }
    }

    async fn watch<K, F>(
        &self,
        api: Api<K>,
        resource: &'static str,
        apply: &F,
    ) -> Result<(), Report<KubernetesError>>
    where
        K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
        F: Fn(&Self, Event<K>),
    {
        let mut stream = watcher(api, watcher::Config::default()).boxed();

        while let Some(event) = stream.next().await {
            match event {
                Ok(event) => {
                    debug!(resource, "Received watch event");
                    apply(self, event);
                }
                Err(e) => {
                    return Err(Report::new(KubernetesError::WatchFailed {
                        resource: resource.to_string(),
                        message: format!("Watch stream error: {e}"),
                    }));
                }
            }
        }

        Ok(())
    }
}
