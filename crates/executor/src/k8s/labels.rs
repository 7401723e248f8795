use k8s_openapi::api::core::v1::Pod;

/// The label that marks a pod as scheduler managed and carries its job id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobIdLabel(String);

impl JobIdLabel {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn key(&self) -> &str {
        &self.0
    }

    /// Job id of the pod, if it carries a non-empty job id label.
    pub fn job_id<'a>(&self, pod: &'a Pod) -> Option<&'a str> {
        pod.metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(&self.0))
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    pub fn is_batch_pod(&self, pod: &Pod) -> bool {
        self.job_id(pod).is_some()
    }
}
