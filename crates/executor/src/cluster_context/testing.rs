//! In-memory [`OrchestrationApi`] that records every call, for tests.

use std::collections::BTreeMap;
use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::time::Duration;

use error_stack::Report;
use k8s_openapi::api::core::v1::Pod;
use kube::runtime::watcher::Event;

use crate::k8s::KubernetesError;
use crate::k8s::OrchestrationApi;
use crate::k8s::PodKey;
use crate::k8s::WatchView;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiAction {
    Create(PodKey),
    Delete(PodKey),
    Patch(PodKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteFailure {
    NotFound,
    ServerError,
}

#[derive(Default)]
pub struct FakeOrchestrationApi {
    pods: Mutex<BTreeMap<PodKey, Pod>>,
    actions: Mutex<Vec<ApiAction>>,
    fail_create: Mutex<bool>,
    fail_patch: Mutex<bool>,
    delete_failure: Mutex<Option<DeleteFailure>>,
    delete_failures_by_pod: Mutex<HashMap<PodKey, DeleteFailure>>,
    delete_delay: Mutex<Option<Duration>>,
    deletes_in_flight: AtomicUsize,
    peak_deletes_in_flight: AtomicUsize,
}

impl FakeOrchestrationApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actions(&self) -> Vec<ApiAction> {
        self.actions.lock().unwrap().clone()
    }

    pub fn clear_actions(&self) {
        self.actions.lock().unwrap().clear();
    }

    pub fn fail_creates(&self) {
        *self.fail_create.lock().unwrap() = true;
    }

    pub fn fail_patches(&self) {
        *self.fail_patch.lock().unwrap() = true;
    }

    pub fn fail_deletes_with(&self, failure: DeleteFailure) {
        *self.delete_failure.lock().unwrap() = Some(failure);
    }

    pub fn fail_delete_of(&self, key: PodKey, failure: DeleteFailure) {
        self.delete_failures_by_pod.lock().unwrap().insert(key, failure);
    }

    pub fn delay_deletes(&self, delay: Duration) {
        *self.delete_delay.lock().unwrap() = Some(delay);
    }

    /// Highest number of delete calls observed running at the same time.
    pub fn peak_concurrent_deletes(&self) -> usize {
        self.peak_deletes_in_flight.load(Ordering::SeqCst)
    }

    /// Deliver the stored pods to the view as a fresh listing, like a watch restart.
    pub fn sync(&self, view: &WatchView) {
        let pods = self.pods.lock().unwrap().values().cloned().collect();
        view.apply_pod_event(Event::Restarted(pods));
        view.apply_node_event(Event::Restarted(vec![]));
    }

    fn record(&self, action: ApiAction) {
        self.actions.lock().unwrap().push(action);
    }
}

#[async_trait::async_trait]
impl OrchestrationApi for FakeOrchestrationApi {
    async fn create_pod(&self, pod: &Pod) -> Result<Pod, Report<KubernetesError>> {
        let key = PodKey::from_pod(pod);
        self.record(ApiAction::Create(key.clone()));

        if *self.fail_create.lock().unwrap() {
            return Err(Report::new(KubernetesError::CreateFailed {
                pod: key,
                message: "server error".to_string(),
            }));
        }

        self.pods.lock().unwrap().insert(key, pod.clone());
        Ok(pod.clone())
    }

    async fn delete_pod(&self, key: &PodKey) -> Result<(), Report<KubernetesError>> {
        self.record(ApiAction::Delete(key.clone()));

        let delay = *self.delete_delay.lock().unwrap();
        if let Some(delay) = delay {
            let running = self.deletes_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_deletes_in_flight.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            self.deletes_in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        let failure = self
            .delete_failures_by_pod
            .lock()
            .unwrap()
            .get(key)
            .copied()
            .or(*self.delete_failure.lock().unwrap());
        match failure {
            Some(DeleteFailure::ServerError) => Err(Report::new(KubernetesError::DeleteFailed {
                pod: key.clone(),
                message: "server error".to_string(),
            })),
            Some(DeleteFailure::NotFound) => Err(Report::new(KubernetesError::PodNotFound {
                pod_name: key.name.clone(),
                namespace: key.namespace.clone(),
            })),
            None => match self.pods.lock().unwrap().remove(key) {
                Some(_) => Ok(()),
                None => Err(Report::new(KubernetesError::PodNotFound {
                    pod_name: key.name.clone(),
                    namespace: key.namespace.clone(),
                })),
            },
        }
    }

    async fn patch_pod_annotations(
        &self,
        key: &PodKey,
        annotations: &BTreeMap<String, String>,
    ) -> Result<Pod, Report<KubernetesError>> {
        self.record(ApiAction::Patch(key.clone()));

        if *self.fail_patch.lock().unwrap() {
            return Err(Report::new(KubernetesError::PatchFailed {
                pod: key.clone(),
                message: "server error".to_string(),
            }));
        }

        let mut pods = self.pods.lock().unwrap();
        let Some(pod) = pods.get_mut(key) else {
            return Err(Report::new(KubernetesError::PodNotFound {
                pod_name: key.name.clone(),
                namespace: key.namespace.clone(),
            }));
        };
        pod.metadata
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(annotations.clone());
        Ok(pod.clone())
    }
}
