//! Pods marked for deletion and the outcome of their latest delete attempt.

use std::time::Duration;
use std::time::Instant;

use k8s_openapi::api::core::v1::Pod;

use crate::k8s::PodKey;
use crate::util::KeyedCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteAttempt {
    /// Marked, never attempted
    Pending,
    /// A reconciliation pass is calling the API for this pod right now
    InFlight,
    /// Last attempt failed with a retryable error
    Failed { at: Instant },
    /// Confirmed gone. Kept for one throttle period to absorb repeated delete requests.
    Deleted { at: Instant },
}

impl DeleteAttempt {
    fn is_due(&self, now: Instant, period: Duration) -> bool {
        match self {
            DeleteAttempt::Pending => true,
            DeleteAttempt::Failed { at } => now.saturating_duration_since(*at) >= period,
            DeleteAttempt::InFlight | DeleteAttempt::Deleted { .. } => false,
        }
    }

    fn is_expired_tombstone(&self, now: Instant, period: Duration) -> bool {
        matches!(self, DeleteAttempt::Deleted { at } if now.saturating_duration_since(*at) >= period)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    AlreadyAbsent,
    Failed,
}

#[derive(Debug, Clone)]
struct PendingDelete {
    pod: Pod,
    attempt: DeleteAttempt,
}

/// Counts by attempt state, for observability.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PendingDeleteStats {
    pub pending: usize,
    pub in_flight: usize,
    pub failed: usize,
    pub tombstones: usize,
}

#[derive(Clone)]
pub struct PendingDeleteCache {
    entries: KeyedCache<PodKey, PendingDelete>,
    min_repeated_delete_period: Duration,
}

impl PendingDeleteCache {
    pub fn new(min_repeated_delete_period: Duration) -> Self {
        Self {
            entries: KeyedCache::new(),
            min_repeated_delete_period,
        }
    }

    /// Mark a pod for deletion. Never calls the API.
    ///
    /// Marking an already pending, failed or in-flight pod keeps its attempt
    /// state, so a throttle in effect is not reset. A tombstone only gives way
    /// to a new pending entry once the throttle period has passed.
    pub fn mark_for_deletion(&self, pod: &Pod, now: Instant) {
        let period = self.min_repeated_delete_period;
        self.entries.upsert(
            PodKey::from_pod(pod),
            |existing| {
                if existing.attempt.is_expired_tombstone(now, period) {
                    *existing = PendingDelete {
                        pod: pod.clone(),
                        attempt: DeleteAttempt::Pending,
                    };
                } else if !matches!(existing.attempt, DeleteAttempt::Deleted { .. }) {
                    existing.pod = pod.clone();
                }
            },
            || PendingDelete {
                pod: pod.clone(),
                attempt: DeleteAttempt::Pending,
            },
        );
    }

    /// Pods still waiting to be deleted. Tombstones are not included.
    pub fn get_all(&self) -> Vec<Pod> {
        self.entries
            .get_all()
            .into_iter()
            .filter(|(_, entry)| !matches!(entry.attempt, DeleteAttempt::Deleted { .. }))
            .map(|(_, entry)| entry.pod)
            .collect()
    }

    pub fn remove(&self, pod: &Pod) {
        self.entries.remove(&PodKey::from_pod(pod));
    }

    #[cfg(test)]
    pub fn attempt(&self, key: &PodKey) -> Option<DeleteAttempt> {
        self.entries.get(key).map(|entry| entry.attempt)
    }

    pub fn keys(&self) -> Vec<PodKey> {
        self.entries.keys()
    }

    /// Claim the entry for a delete attempt if one is due.
    ///
    /// The check and the transition to [`DeleteAttempt::InFlight`] happen under
    /// the entry's lock, so overlapping passes never attempt the same pod twice.
    /// The returned claim must be resolved with [`AttemptClaim::finish`]; a claim
    /// dropped unresolved counts as a failure at `now`.
    pub fn try_begin_attempt(&self, key: &PodKey, now: Instant) -> Option<AttemptClaim<'_>> {
        let period = self.min_repeated_delete_period;
        let claimed = self
            .entries
            .update(key, |entry| {
                if entry.attempt.is_due(now, period) {
                    entry.attempt = DeleteAttempt::InFlight;
                    true
                } else {
                    false
                }
            })
            .unwrap_or(false);

        claimed.then(|| AttemptClaim {
            cache: self,
            key: key.clone(),
            started_at: now,
            finished: false,
        })
    }

    fn record_attempt(&self, key: &PodKey, outcome: DeleteOutcome, at: Instant) {
        self.entries.update(key, |entry| {
            if entry.attempt != DeleteAttempt::InFlight {
                return;
            }
            entry.attempt = match outcome {
                DeleteOutcome::Deleted | DeleteOutcome::AlreadyAbsent => {
                    DeleteAttempt::Deleted { at }
                }
                DeleteOutcome::Failed => DeleteAttempt::Failed { at },
            };
        });
    }

    /// Forget tombstones older than the throttle period.
    pub fn purge_expired_tombstones(&self, now: Instant) {
        let period = self.min_repeated_delete_period;
        self.entries
            .retain(|_, entry| !entry.attempt.is_expired_tombstone(now, period));
    }

    pub fn stats(&self) -> PendingDeleteStats {
        self.entries
            .get_all()
            .into_iter()
            .fold(PendingDeleteStats::default(), |mut stats, (_, entry)| {
                match entry.attempt {
                    DeleteAttempt::Pending => stats.pending += 1,
                    DeleteAttempt::InFlight => stats.in_flight += 1,
                    DeleteAttempt::Failed { .. } => stats.failed += 1,
                    DeleteAttempt::Deleted { .. } => stats.tombstones += 1,
                }
                stats
            })
    }
}

/// An in-flight delete attempt owned by one reconciliation pass.
///
/// If the pass is dropped before the API call returns, the entry leaves
/// [`DeleteAttempt::InFlight`] as a failure stamped with the claim time, so it
/// is retried after the throttle period instead of being stuck.
pub struct AttemptClaim<'a> {
    cache: &'a PendingDeleteCache,
    key: PodKey,
    started_at: Instant,
    finished: bool,
}

impl AttemptClaim<'_> {
    pub fn key(&self) -> &PodKey {
        &self.key
    }

    pub fn finish(mut self, outcome: DeleteOutcome, at: Instant) {
        self.finished = true;
        self.cache.record_attempt(&self.key, outcome, at);
    }
}

impl Drop for AttemptClaim<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.cache
                .record_attempt(&self.key, DeleteOutcome::Failed, self.started_at);
        }
    }
}
