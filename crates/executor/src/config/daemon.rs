use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::cluster_context::ClusterContextConfig;
use crate::k8s::JobIdLabel;

#[derive(Parser, Debug, Clone)]
pub struct DaemonArgs {
    #[arg(
        long,
        env = "KUBECONFIG",
        value_hint = clap::ValueHint::FilePath,
        help = "Path to a kubeconfig file; in-cluster or default config is used when unset"
    )]
    pub kubeconfig: Option<PathBuf>,

    #[arg(long, env = "CLUSTER_ID", help = "Identifier of the cluster this executor serves")]
    pub cluster_id: String,

    #[arg(
        long,
        env = "EXECUTOR_NAMESPACE",
        help = "Only watch pods in this namespace; all namespaces when unset"
    )]
    pub namespace: Option<String>,

    #[arg(
        long,
        default_value = "armada_job_id",
        help = "Label key carrying the job id of batch pods"
    )]
    pub job_id_label: String,

    #[arg(
        long,
        default_value = "120",
        help = "Minimum seconds between two delete attempts for the same pod"
    )]
    pub min_repeated_delete_period_secs: u64,

    #[arg(
        long,
        default_value = "1000",
        help = "Interval in milliseconds between pending delete reconciliation passes"
    )]
    pub delete_interval_ms: u64,

    #[arg(
        long,
        default_value = "16",
        help = "Maximum number of pod delete calls in flight during one reconciliation pass"
    )]
    pub delete_concurrency: usize,

    #[arg(
        long,
        default_value = "60",
        help = "Seconds a submitted pod may stay unseen by the watch before it is forgotten"
    )]
    pub submitted_pod_ttl_secs: u64,

    #[arg(
        long,
        default_value = "0.0.0.0:8080",
        help = "Listen address for the health endpoint"
    )]
    pub health_listen_addr: String,
}

impl DaemonArgs {
    pub fn delete_interval(&self) -> Duration {
        Duration::from_millis(self.delete_interval_ms.max(1))
    }
}

impl From<&DaemonArgs> for ClusterContextConfig {
    fn from(args: &DaemonArgs) -> Self {
        Self {
            cluster_id: args.cluster_id.clone(),
            job_id_label: JobIdLabel::new(args.job_id_label.clone()),
            min_repeated_delete_period: Duration::from_secs(args.min_repeated_delete_period_secs),
            submitted_pod_ttl: Duration::from_secs(args.submitted_pod_ttl_secs),
            delete_concurrency: args.delete_concurrency.max(1),
        }
    }
}
