//! The worker's main loop (`spec.md` §4.G): claim a job, report it
//! started on both the task record and the worker's own health entry, run
//! it through the registered handler, write the terminal outcome, repeat.
//! Mirrors `llmflow_flow::flow::run`'s "create row -> body -> terminal
//! write" shape one layer up, over Task Queue jobs instead of flow steps.

use std::sync::Arc;

use llmflow_db::DbHandle;
use llmflow_queue::{TaskQueue, TaskStore, WorkerDirectory, WorkerHealthStore};
use tokio_util::sync::CancellationToken;

use crate::handler::HandlerRegistry;
use crate::heartbeat;

pub struct WorkerApp {
    pub worker_id: String,
    pub queue_name: String,
    pub poll_timeout_secs: f64,
    pub queue: Arc<TaskQueue>,
    pub workers: Arc<WorkerDirectory>,
    pub handlers: HandlerRegistry,
    pub db: DbHandle,
}

impl WorkerApp {
    /// Registers the worker and starts its heartbeat loop (`spec.md` §4.G
    /// worker lifecycle steps 1-2), then blocks draining `queue_name`
    /// until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> anyhow::Result<()> {
        self.workers.register(&self.worker_id, &self.queue_name, &hostname(), std::process::id(), env!("CARGO_PKG_VERSION")).await?;
        let heartbeat_cancel = CancellationToken::new();
        let heartbeat_handle = heartbeat::spawn(self.workers.clone(), self.worker_id.clone(), heartbeat_cancel.clone());

        tracing::info!(worker_id = %self.worker_id, queue = %self.queue_name, "worker ready");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                job = self.queue.dequeue(&self.queue_name, self.poll_timeout_secs) => {
                    match job {
                        Ok(Some(job)) => self.handle_one(job).await,
                        Ok(None) => {} // poll timeout; loop back around and re-check shutdown
                        Err(error) => tracing::warn!(%error, "failed to dequeue a job, retrying"),
                    }
                }
            }
        }

        tracing::info!(worker_id = %self.worker_id, "worker shutting down");
        heartbeat_cancel.cancel();
        let _ = heartbeat_handle.await;
        self.workers.mark_offline(&self.worker_id).await?;
        if let Some(health) = self.workers.get(&self.worker_id).await? {
            WorkerHealthStore::mirror_offline(self.db.connection(), &health).await?;
        }
        Ok(())
    }

    async fn handle_one(&self, job: llmflow_queue::FlowJob) {
        let task_id = job.task_id;
        tracing::info!(task_id = %task_id, flow_name = %job.flow_name, task_type = %job.task_type, "claimed task");

        if let Err(error) = self.queue.mark_task_started(task_id, &self.worker_id).await {
            tracing::warn!(%error, task_id = %task_id, "failed to mark task started; executing anyway");
        }
        if let Err(error) = self.workers.report_task_started(&self.worker_id).await {
            tracing::warn!(%error, worker_id = %self.worker_id, "failed to report worker busy");
        }

        let result = self.handlers.dispatch(&job).await;

        let (outputs, error_message) = match result {
            Ok(outputs) => (Some(outputs), None),
            Err(error) => {
                tracing::error!(%error, task_id = %task_id, "task handler failed");
                (None, Some(error.to_string()))
            }
        };

        if let Err(error) = self.queue.complete_task(task_id, outputs, error_message).await {
            tracing::warn!(%error, task_id = %task_id, "failed to write terminal task status");
        }
        if let Err(error) = self.workers.report_task_completed(&self.worker_id).await {
            tracing::warn!(%error, worker_id = %self.worker_id, "failed to report worker idle");
        }

        if let Ok(Some(status)) = self.queue.get_task_status(task_id).await {
            if let Err(error) = TaskStore::mirror_terminal(self.db.connection(), &status).await {
                tracing::warn!(%error, task_id = %task_id, "failed to mirror terminal task status");
            }
        }
    }
}

fn hostname() -> String {
    std::env::var("HOSTNAME").or_else(|_| std::env::var("COMPUTERNAME")).unwrap_or_else(|_| "unknown-host".to_owned())
}
