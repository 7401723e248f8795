pub mod tasks;

use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use kube::Client;

use crate::cluster_context::ClusterContext;
use crate::cluster_context::ClusterContextConfig;
use crate::cluster_context::KubernetesClusterContext;
use crate::config::DaemonArgs;
use crate::k8s::kube_client;
use crate::k8s::KubeOrchestrationApi;
use crate::k8s::WatchView;
use crate::util::SystemTimeSource;
use tasks::Tasks;

/// Wired up executor: one cluster context plus the client feeding its watch view
pub struct Application {
    context: Arc<KubernetesClusterContext>,
    client: Client,
    daemon_args: DaemonArgs,
}

impl Application {
    /// Connect to the cluster and build the cluster context.
    pub async fn build(daemon_args: DaemonArgs) -> Result<Self> {
        let client = kube_client::connect(daemon_args.kubeconfig.as_deref())
            .await
            .map_err(|report| anyhow::anyhow!("{report:?}"))
            .context("connect to kubernetes")?;

        let context = KubernetesClusterContext::new(
            ClusterContextConfig::from(&daemon_args),
            Arc::new(KubeOrchestrationApi::new(client.clone())),
            WatchView::new(),
            Arc::new(SystemTimeSource),
        );

        Ok(Self {
            context: Arc::new(context),
            client,
            daemon_args,
        })
    }

    pub fn context(&self) -> &Arc<KubernetesClusterContext> {
        &self.context
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn daemon_args(&self) -> &DaemonArgs {
        &self.daemon_args
    }

    /// Start all tasks and wait until shutdown is requested or a task exits.
    pub async fn run(&self) -> Result<()> {
        tracing::info!(
            cluster_id = self.context.cluster_id(),
            "Starting executor tasks"
        );

        let mut tasks = Tasks::new(self.context.cancellation_token());
        tasks.spawn_all_tasks(self);

        if let Err(e) = tasks.wait_for_completion(self.context.as_ref()).await {
            tracing::error!("Error during task execution: {e}");
            return Err(e);
        }

        tracing::info!("Executor run completed");
        Ok(())
    }

    pub fn shutdown(&self) {
        self.context.stop();
    }
}
