//! Pods this executor created that the watch view has not reported yet.

use std::time::Duration;
use std::time::Instant;

use k8s_openapi::api::core::v1::Pod;
use tracing::debug;

use crate::k8s::JobIdLabel;
use crate::k8s::PodEvent;
use crate::k8s::PodEventHandler;
use crate::k8s::PodKey;
use crate::util::KeyedCache;

/// Key used to match a submitted pod against the watch view.
///
/// Batch pods are matched by job id. Pods without one fall back to their identity.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum SubmissionKey {
    Job(String),
    Pod(PodKey),
}

#[derive(Debug, Clone)]
struct SubmittedPod {
    pod: Pod,
    submitted_at: Instant,
}

/// Write-through cache covering the gap between a successful create call and
/// the pod's first appearance in the watch view.
#[derive(Clone)]
pub struct SubmittedPodCache {
    job_id_label: JobIdLabel,
    entries: KeyedCache<SubmissionKey, SubmittedPod>,
}

impl SubmittedPodCache {
    pub fn new(job_id_label: JobIdLabel) -> Self {
        Self {
            job_id_label,
            entries: KeyedCache::new(),
        }
    }

    pub fn key_for(&self, pod: &Pod) -> SubmissionKey {
        match self.job_id_label.job_id(pod) {
            Some(job_id) => SubmissionKey::Job(job_id.to_string()),
            None => SubmissionKey::Pod(PodKey::from_pod(pod)),
        }
    }

    pub fn add(&self, pod: Pod, now: Instant) {
        let key = self.key_for(&pod);
        self.entries.add(
            key,
            SubmittedPod {
                pod,
                submitted_at: now,
            },
        );
    }

    pub fn remove(&self, key: &SubmissionKey) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn exists(&self, key: &SubmissionKey) -> bool {
        self.entries.exists(key)
    }

    pub fn get_all(&self) -> Vec<Pod> {
        self.entries
            .get_all()
            .into_iter()
            .map(|(_, submitted)| submitted.pod)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Drop entries submitted more than `ttl` ago, returning how many were dropped.
    pub fn expire_older_than(&self, ttl: Duration, now: Instant) -> usize {
        let mut expired = 0;
        self.entries.retain(|_, submitted| {
            let keep = now.saturating_duration_since(submitted.submitted_at) < ttl;
            if !keep {
                expired += 1;
            }
            keep
        });
        expired
    }
}

/// Any event for a pod means the watch view knows about it now.
impl PodEventHandler for SubmittedPodCache {
    fn on_pod_event(&self, event: &PodEvent) {
        let key = self.key_for(event.pod());
        if self.remove(&key) {
            debug!(key = ?key, "Pod visible in watch view, removed from submitted cache");
        }
    }
}
