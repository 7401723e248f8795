use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::Application;
use crate::cluster_context::ClusterContext;
use crate::cluster_context::KubernetesClusterContext;
use crate::health::HealthServer;
use crate::health::MultiChecker;
use crate::health::WatchViewSyncChecker;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Task manager, responsible for starting and managing all background tasks
pub struct Tasks {
    pub tasks: Vec<JoinHandle<()>>,
    cancellation_token: CancellationToken,
}

impl Tasks {
    pub fn new(cancellation_token: CancellationToken) -> Self {
        Self {
            tasks: Vec::new(),
            cancellation_token,
        }
    }

    /// Start all background tasks
    pub fn spawn_all_tasks(&mut self, app: &Application) {
        let watch_task = self.spawn_watch_view_task(app);
        self.tasks.push(watch_task);

        let reconcile_task = self.spawn_reconcile_task(app);
        self.tasks.push(reconcile_task);

        let health_task = self.spawn_health_server_task(app);
        self.tasks.push(health_task);
    }

    /// wait for tasks to complete or receive shutdown signal
    pub async fn wait_for_completion(&mut self, context: &dyn ClusterContext) -> Result<()> {
        let signal_handler = {
            use tokio::signal::unix::signal;
            use tokio::signal::unix::SignalKind;
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;

            tokio::spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => {
                        tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    }
                    _ = sigint.recv() => {
                        tracing::info!("Received SIGINT, initiating graceful shutdown");
                    }
                }
            })
        };

        tokio::select! {
            _ = signal_handler => {
                tracing::info!("Shutdown signal received, cancelling all tasks");
                context.stop();
                self.wait_for_tasks_with_timeout(SHUTDOWN_TIMEOUT).await;
            }
            result = futures::future::select_all(&mut self.tasks) => {
                let (result, _index, _remaining) = result;
                context.stop();
                if let Err(e) = result {
                    tracing::error!("Task completed with error: {e}");
                    return Err(e.into());
                }
                tracing::warn!("Task completed unexpectedly");
            }
        }

        Ok(())
    }

    async fn wait_for_tasks_with_timeout(&mut self, timeout: Duration) {
        tokio::time::timeout(timeout, async {
            for task in &mut self.tasks {
                if let Err(e) = task.await {
                    tracing::error!("Task failed during shutdown: {e}");
                }
            }
        })
        .await
        .unwrap_or_else(|_| {
            tracing::warn!("Task shutdown timed out after {:?}", timeout);
        });
    }

    fn spawn_watch_view_task(&self, app: &Application) -> JoinHandle<()> {
        let watch_view = app.context().watch_view().clone();
        let client = app.client().clone();
        let namespace = app.daemon_args().namespace.clone();
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            tracing::info!("Starting watch view task");
            watch_view.run(client, namespace, token).await;
            tracing::info!("Watch view task completed");
        })
    }

    fn spawn_reconcile_task(&self, app: &Application) -> JoinHandle<()> {
        let context = app.context().clone();
        let interval = app.daemon_args().delete_interval();
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            tracing::info!("Starting pod reconciliation task");
            run_reconcile_loop(context, interval, token).await;
            tracing::info!("Pod reconciliation task completed");
        })
    }

    fn spawn_health_server_task(&self, app: &Application) -> JoinHandle<()> {
        let mut checker = MultiChecker::new();
        checker.add(Arc::new(WatchViewSyncChecker::new(
            app.context().watch_view().clone(),
        )));
        let server = HealthServer::new(
            Arc::new(checker),
            app.daemon_args().health_listen_addr.clone(),
        );
        let token = self.cancellation_token.clone();

        tokio::spawn(async move {
            if let Err(e) = server.run(token).await {
                tracing::error!("Health server failed: {e:?}");
            }
        })
    }
}

/// Drive pending deletes and submitted pod expiry until cancelled.
pub async fn run_reconcile_loop(
    context: Arc<KubernetesClusterContext>,
    interval: Duration,
    cancellation_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancellation_token.cancelled() => break,
            _ = ticker.tick() => {
                context.process_pods_to_delete().await;
                context.expire_stale_submissions();
            }
        }
    }
}
