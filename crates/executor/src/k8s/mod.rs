//! Kubernetes integration module.
//!
//! The main components are:
//! - [`WatchView`]: local mirror of pods and nodes fed by watch streams
//! - [`OrchestrationApi`]: the pod write operations the executor performs
//! - [`JobIdLabel`]: recognises scheduler managed ("batch") pods

pub mod kube_client;
pub mod labels;
pub mod orchestration_api;
pub mod types;
pub mod watch_view;

pub use labels::JobIdLabel;
pub use orchestration_api::KubeOrchestrationApi;
pub use orchestration_api::OrchestrationApi;
pub use types::KubernetesError;
pub use types::PodEvent;
pub use types::PodKey;
pub use watch_view::PodEventHandler;
pub use watch_view::WatchView;
