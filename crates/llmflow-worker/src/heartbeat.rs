//! The 30-second heartbeat loop (`spec.md` §4.G worker lifecycle step 2),
//! spawned once at startup and cancelled on shutdown.

use std::sync::Arc;

use llmflow_queue::{WorkerDirectory, HEARTBEAT_INTERVAL_SECS};
use tokio_util::sync::CancellationToken;

pub fn spawn(directory: Arc<WorkerDirectory>, worker_id: String, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(error) = directory.heartbeat(&worker_id).await {
                        tracing::warn!(%error, worker_id = %worker_id, "failed to write heartbeat");
                    }
                }
                _ = cancel.cancelled() => break,
            }
        }
    })
}
