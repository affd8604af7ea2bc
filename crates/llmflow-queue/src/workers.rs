//! Worker lifecycle reporting, observer side (`spec.md` §4.G "Worker
//! lifecycle"). `WorkerDirectory` is the read/write surface both the
//! worker process (writing its own heartbeats) and an admin dashboard
//! (scanning `worker:*`) share.

use time::OffsetDateTime;

use crate::keys::{worker_key, WORKER_TTL_SECS};
use crate::model::{WorkerHealth, WorkerState};
use crate::redis::{QueueTransportError, RedisHandle};

#[derive(Debug, thiserror::Error)]
pub enum WorkerDirectoryError {
    #[error(transparent)]
    Transport(#[from] QueueTransportError),
    #[error("worker {0} has no recorded health entry (never registered, or its TTL lapsed)")]
    NotFound(String),
}

pub struct WorkerDirectory {
    redis: RedisHandle,
}

impl WorkerDirectory {
    pub fn new(redis: RedisHandle) -> Self {
        WorkerDirectory { redis }
    }

    /// `spec.md` §4.G worker lifecycle step 1: register on startup.
    pub async fn register(&self, worker_id: &str, queue_name: &str, host: &str, pid: u32, version: &str) -> Result<(), WorkerDirectoryError> {
        let health = WorkerHealth {
            worker_id: worker_id.to_owned(),
            status: WorkerState::Idle,
            last_heartbeat: OffsetDateTime::now_utc(),
            current_tasks: 0,
            total_processed: 0,
            queue_name: queue_name.to_owned(),
            host: host.to_owned(),
            pid,
            version: version.to_owned(),
        };
        self.write(&health).await
    }

    /// The 30-second heartbeat loop (`spec.md` §4.G step 2): writes
    /// `status=healthy` without disturbing `current_tasks`/`total_processed`.
    pub async fn heartbeat(&self, worker_id: &str) -> Result<(), WorkerDirectoryError> {
        let mut health = self.require(worker_id).await?;
        health.status = WorkerState::Healthy;
        health.last_heartbeat = OffsetDateTime::now_utc();
        self.write(&health).await
    }

    /// `spec.md` §4.G step 3, job start: status busy, `current_tasks=1`.
    pub async fn report_task_started(&self, worker_id: &str) -> Result<(), WorkerDirectoryError> {
        let mut health = self.require(worker_id).await?;
        health.status = WorkerState::Busy;
        health.current_tasks = 1;
        health.last_heartbeat = OffsetDateTime::now_utc();
        self.write(&health).await
    }

    /// `spec.md` §4.G step 3, job finish (success or failure alike):
    /// status idle, `current_tasks=0`, `total_processed` increments.
    pub async fn report_task_completed(&self, worker_id: &str) -> Result<(), WorkerDirectoryError> {
        let mut health = self.require(worker_id).await?;
        health.status = WorkerState::Idle;
        health.current_tasks = 0;
        health.total_processed += 1;
        health.last_heartbeat = OffsetDateTime::now_utc();
        self.write(&health).await
    }

    /// `spec.md` §4.G step 4, shutdown.
    pub async fn mark_offline(&self, worker_id: &str) -> Result<(), WorkerDirectoryError> {
        let mut health = self.require(worker_id).await?;
        health.status = WorkerState::Offline;
        self.write(&health).await
    }

    pub async fn get(&self, worker_id: &str) -> Result<Option<WorkerHealth>, WorkerDirectoryError> {
        match self.redis.get(&worker_key(worker_id)).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw).map_err(QueueTransportError::from)?)),
            None => Ok(None),
        }
    }

    /// Lists every worker the observation store currently remembers,
    /// including ones whose TTL has not yet lapsed but whose last
    /// heartbeat is already stale -- callers use `WorkerHealth::is_offline`
    /// to tell the difference (`spec.md` §3 `WorkerHealth` invariant).
    pub async fn list(&self) -> Result<Vec<WorkerHealth>, WorkerDirectoryError> {
        let keys = self.redis.scan_keys("worker:*").await?;
        let mut workers = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(raw) = self.redis.get(&key).await? {
                if let Ok(health) = serde_json::from_str(&raw) {
                    workers.push(health);
                }
            }
        }
        Ok(workers)
    }

    async fn require(&self, worker_id: &str) -> Result<WorkerHealth, WorkerDirectoryError> {
        self.get(worker_id).await?.ok_or_else(|| WorkerDirectoryError::NotFound(worker_id.to_owned()))
    }

    async fn write(&self, health: &WorkerHealth) -> Result<(), WorkerDirectoryError> {
        let payload = serde_json::to_string(health).map_err(QueueTransportError::from)?;
        self.redis.setex(&worker_key(&health.worker_id), WORKER_TTL_SECS, &payload).await?;
        Ok(())
    }
}

pub const WORKER_OFFLINE_TTL: time::Duration = time::Duration::seconds(WORKER_TTL_SECS as i64);
