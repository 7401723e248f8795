//! The executor's single point of contact with the cluster.
//!
//! [`KubernetesClusterContext`] submits, deletes and annotates pods and answers
//! pod/node queries. Two caches paper over the eventual consistency of the
//! watch view:
//! - [`SubmittedPodCache`]: pods created by this process that the watch view has
//!   not reported yet
//! - [`PendingDeleteCache`]: pods marked for deletion, retried by
//!   [`ClusterContext::process_pods_to_delete`] under a per-pod throttle

pub mod pods_to_delete;
pub mod submitted_pods;
#[cfg(test)]
pub(crate) mod testing;

use std::collections::BTreeMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use error_stack::Report;
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::core::v1::Pod;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

pub use pods_to_delete::AttemptClaim;
pub use pods_to_delete::DeleteAttempt;
pub use pods_to_delete::DeleteOutcome;
pub use pods_to_delete::PendingDeleteCache;
pub use pods_to_delete::PendingDeleteStats;
pub use submitted_pods::SubmissionKey;
pub use submitted_pods::SubmittedPodCache;

use crate::k8s::JobIdLabel;
use crate::k8s::KubernetesError;
use crate::k8s::OrchestrationApi;
use crate::k8s::PodEventHandler;
use crate::k8s::PodKey;
use crate::k8s::WatchView;
use crate::util::TimeSource;

#[derive(Debug, Clone)]
pub struct ClusterContextConfig {
    pub cluster_id: String,
    pub job_id_label: JobIdLabel,
    /// Minimum time between two delete attempts for the same pod
    pub min_repeated_delete_period: Duration,
    /// How long a submitted pod may stay unconfirmed before it is forgotten
    pub submitted_pod_ttl: Duration,
    /// Upper bound on delete calls one reconciliation pass keeps in flight
    pub delete_concurrency: usize,
}

/// Operations the scheduler-facing layer performs against the cluster.
#[async_trait::async_trait]
pub trait ClusterContext: Send + Sync {
    fn cluster_id(&self) -> &str;

    /// Register an additional handler for pod events from the watch view.
    fn add_pod_event_handler(&self, handler: Arc<dyn PodEventHandler>);

    /// Create the pod. The created pod is visible through the pod queries
    /// immediately, even before the watch view reports it.
    async fn submit_pod(&self, pod: Pod) -> Result<Pod, Report<KubernetesError>>;

    /// Mark pods for deletion. The actual delete happens in a later
    /// [`ClusterContext::process_pods_to_delete`] pass.
    fn delete_pods(&self, pods: &[Pod]);

    /// Run one reconciliation pass over the pods marked for deletion.
    async fn process_pods_to_delete(&self);

    /// Watch view pods plus submitted pods not yet visible in it.
    fn get_all_pods(&self) -> Result<Vec<Pod>, Report<KubernetesError>>;

    /// [`ClusterContext::get_all_pods`] restricted to pods with a job id.
    fn get_batch_pods(&self) -> Result<Vec<Pod>, Report<KubernetesError>>;

    /// Pods with a job id that the watch view has confirmed.
    fn get_active_batch_pods(&self) -> Result<Vec<Pod>, Report<KubernetesError>>;

    async fn add_annotation(
        &self,
        pod: &Pod,
        annotations: BTreeMap<String, String>,
    ) -> Result<(), Report<KubernetesError>>;

    fn get_nodes(&self) -> Result<Vec<Node>, Report<KubernetesError>>;

    /// Signal background loops bound to this context to stop.
    fn stop(&self);
}

pub struct KubernetesClusterContext {
    config: ClusterContextConfig,
    api: Arc<dyn OrchestrationApi>,
    watch_view: Arc<WatchView>,
    submitted_pods: SubmittedPodCache,
    pods_to_delete: PendingDeleteCache,
    time_source: Arc<dyn TimeSource>,
    cancellation_token: CancellationToken,
}

impl KubernetesClusterContext {
    /// Create the context and subscribe its submitted pod cache to the watch view.
    pub fn new(
        config: ClusterContextConfig,
        api: Arc<dyn OrchestrationApi>,
        watch_view: Arc<WatchView>,
        time_source: Arc<dyn TimeSource>,
    ) -> Self {
        let submitted_pods = SubmittedPodCache::new(config.job_id_label.clone());
        watch_view.add_pod_event_handler(Arc::new(submitted_pods.clone()));

        Self {
            pods_to_delete: PendingDeleteCache::new(config.min_repeated_delete_period),
            config,
            api,
            watch_view,
            submitted_pods,
            time_source,
            cancellation_token: CancellationToken::new(),
        }
    }

    pub fn watch_view(&self) -> &Arc<WatchView> {
        &self.watch_view
    }

    /// Token cancelled by [`ClusterContext::stop`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn pending_delete_stats(&self) -> PendingDeleteStats {
        self.pods_to_delete.stats()
    }

    /// Forget submitted pods the watch view never confirmed within the TTL.
    pub fn expire_stale_submissions(&self) {
        let expired = self
            .submitted_pods
            .expire_older_than(self.config.submitted_pod_ttl, self.time_source.now());
        if expired > 0 {
            warn!(
                expired,
                ttl = ?self.config.submitted_pod_ttl,
                "Submitted pods were never reported by the watch view"
            );
        }
    }

    async fn delete_pod(&self, claim: AttemptClaim<'_>) {
        let key = claim.key().clone();
        let outcome = match self.api.delete_pod(&key).await {
            Ok(()) => {
                info!(pod = %key, "Deleted pod");
                DeleteOutcome::Deleted
            }
            Err(e) if matches!(e.current_context(), KubernetesError::PodNotFound { .. }) => {
                debug!(pod = %key, "Pod already absent");
                DeleteOutcome::AlreadyAbsent
            }
            Err(e) => {
                warn!(
                    pod = %key,
                    retry_after = ?self.config.min_repeated_delete_period,
                    "Failed to delete pod: {e:?}"
                );
                DeleteOutcome::Failed
            }
        };

        claim.finish(outcome, self.time_source.now());
    }

    fn merge_with_submitted(&self, mut pods: Vec<Pod>) -> Vec<Pod> {
        let mut seen: HashSet<SubmissionKey> = pods
            .iter()
            .map(|pod| self.submitted_pods.key_for(pod))
            .collect();

        for pod in self.submitted_pods.get_all() {
            if seen.insert(self.submitted_pods.key_for(&pod)) {
                pods.push(pod);
            }
        }
        pods
    }
}

#[async_trait::async_trait]
impl ClusterContext for KubernetesClusterContext {
    fn cluster_id(&self) -> &str {
        &self.config.cluster_id
    }

    fn add_pod_event_handler(&self, handler: Arc<dyn PodEventHandler>) {
        self.watch_view.add_pod_event_handler(handler);
    }

    async fn submit_pod(&self, pod: Pod) -> Result<Pod, Report<KubernetesError>> {
        let created = self.api.create_pod(&pod).await?;

        let key = PodKey::from_pod(&created);
        self.submitted_pods
            .add(created.clone(), self.time_source.now());
        // The add event may have been delivered while the create call was in flight.
        if self.watch_view.contains_pod(&key) {
            self.submitted_pods
                .remove(&self.submitted_pods.key_for(&created));
        }

        debug!(pod = %key, "Submitted pod");
        Ok(created)
    }

    fn delete_pods(&self, pods: &[Pod]) {
        let now = self.time_source.now();
        for pod in pods {
            self.pods_to_delete.mark_for_deletion(pod, now);
        }
    }

    #[tracing::instrument(skip(self), fields(cluster_id = %self.config.cluster_id))]
    async fn process_pods_to_delete(&self) {
        let now = self.time_source.now();
        self.pods_to_delete.purge_expired_tombstones(now);

        let due: Vec<AttemptClaim<'_>> = self
            .pods_to_delete
            .keys()
            .into_iter()
            .filter_map(|key| self.pods_to_delete.try_begin_attempt(&key, now))
            .collect();

        if !due.is_empty() {
            debug!(count = due.len(), "Deleting pods");
            let limit = self.config.delete_concurrency.max(1);
            futures::stream::iter(due)
                .for_each_concurrent(limit, |claim| self.delete_pod(claim))
                .await;
        }

        let stats = self.pods_to_delete.stats();
        debug!(
            pending = stats.pending,
            failed = stats.failed,
            in_flight = stats.in_flight,
            "Finished delete pass"
        );
    }

    fn get_all_pods(&self) -> Result<Vec<Pod>, Report<KubernetesError>> {
        let pods = self.watch_view.list_pods()?;
        Ok(self.merge_with_submitted(pods))
    }

    fn get_batch_pods(&self) -> Result<Vec<Pod>, Report<KubernetesError>> {
        let label = &self.config.job_id_label;
        Ok(self
            .get_all_pods()?
            .into_iter()
            .filter(|pod| label.is_batch_pod(pod))
            .collect())
    }

    fn get_active_batch_pods(&self) -> Result<Vec<Pod>, Report<KubernetesError>> {
        let label = &self.config.job_id_label;
        Ok(self
            .watch_view
            .list_pods()?
            .into_iter()
            .filter(|pod| label.is_batch_pod(pod))
            .collect())
    }

    async fn add_annotation(
        &self,
        pod: &Pod,
        annotations: BTreeMap<String, String>,
    ) -> Result<(), Report<KubernetesError>> {
        self.api
            .patch_pod_annotations(&PodKey::from_pod(pod), &annotations)
            .await
            .map(|_| ())
    }

    fn get_nodes(&self) -> Result<Vec<Node>, Report<KubernetesError>> {
        self.watch_view.list_nodes()
    }

    fn stop(&self) {
        info!(cluster_id = %self.config.cluster_id, "Stopping cluster context");
        self.cancellation_token.cancel();
    }
}
