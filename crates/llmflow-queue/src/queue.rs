//! The Task Queue Service, submitter side (`spec.md` §4.G).
//!
//! Submission, status transitions and progress reporting are all plain
//! read-modify-write round trips against the `task:<id>`/`progress:<id>`
//! keys -- there is no cross-process locking here (matching `spec.md` §5:
//! "the Task Queue Service is a process-wide singleton" within one
//! process; the Redis server is the only thing multiple processes share).

use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::keys::{progress_key, queue_stats_key, task_key, DEFAULT_QUEUE_NAME, PROGRESS_TTL_SECS, TASK_TTL_SECS};
use crate::model::{FlowJob, ProgressUpdate, SubmitOutcome, TaskState, TaskStatus};
use crate::redis::{QueueTransportError, RedisHandle};

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error(transparent)]
    Transport(#[from] QueueTransportError),
    #[error("task {0} was not found (expired or never submitted)")]
    NotFound(Uuid),
}

/// Everything `submit_flow_task` needs beyond the flow name and inputs.
#[derive(Debug, Clone, Default)]
pub struct SubmitOptions {
    pub flow_run_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    pub queue_name: Option<String>,
    pub priority: i32,
    pub task_type: Option<String>,
    /// Seconds to wait before the job becomes visible to workers
    /// (`spec.md` §4.G step 2, "optionally deferred by `delay` seconds").
    pub delay_secs: Option<u64>,
}

pub struct TaskQueue {
    redis: RedisHandle,
}

impl TaskQueue {
    pub fn new(redis: RedisHandle) -> Self {
        TaskQueue { redis }
    }

    pub fn redis(&self) -> &RedisHandle {
        &self.redis
    }

    /// `spec.md` §4.G `submit_flow_task`: generates a task id, enqueues the
    /// job (immediately, or after `delay_secs` on a detached task), and
    /// writes the initial `pending` `TaskStatus`.
    pub async fn submit_flow_task(&self, flow_name: &str, inputs: Value, options: SubmitOptions) -> Result<SubmitOutcome, QueueError> {
        let task_id = Uuid::new_v4();
        let queue_name = options.queue_name.unwrap_or_else(|| DEFAULT_QUEUE_NAME.to_owned());
        let now = OffsetDateTime::now_utc();

        let status = TaskStatus {
            task_id,
            flow_name: flow_name.to_owned(),
            flow_run_id: options.flow_run_id,
            status: TaskState::Pending,
            inputs: inputs.clone(),
            outputs: None,
            progress_percentage: 0,
            current_step: None,
            worker_id: None,
            queue_name: queue_name.clone(),
            priority: options.priority,
            retry_count: 0,
            user_id: options.user_id,
            error_message: None,
            created_at: now,
            started_at: None,
            completed_at: None,
        };
        self.write_status(&status).await?;

        let job = FlowJob {
            task_id,
            flow_name: flow_name.to_owned(),
            flow_run_id: options.flow_run_id,
            inputs,
            user_id: options.user_id,
            task_type: options.task_type.unwrap_or_else(|| "flow".to_owned()),
        };
        let payload = serde_json::to_string(&job).map_err(QueueTransportError::from)?;

        let delay_secs = options.delay_secs.unwrap_or(0);
        if delay_secs == 0 {
            self.redis.enqueue_job(&queue_name, &payload).await?;
        } else {
            let redis = self.redis.clone();
            let queue_name_for_task = queue_name.clone();
            tokio::spawn(async move {
                tokio::time::sleep(std::time::Duration::from_secs(delay_secs)).await;
                if let Err(error) = redis.enqueue_job(&queue_name_for_task, &payload).await {
                    tracing::warn!(%error, task_id = %task_id, "failed to enqueue deferred task");
                }
            });
        }

        Ok(SubmitOutcome { task_id, flow_run_id: options.flow_run_id, queue_name, estimated_delay_secs: delay_secs, status: TaskState::Pending })
    }

    pub async fn get_task_status(&self, task_id: Uuid) -> Result<Option<TaskStatus>, QueueError> {
        match self.redis.get(&task_key(&task_id.to_string())).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw).map_err(QueueTransportError::from)?)),
            None => Ok(None),
        }
    }

    /// `pending -> in_progress`: a worker claims the task (`spec.md` §4.G).
    pub async fn mark_task_started(&self, task_id: Uuid, worker_id: &str) -> Result<(), QueueError> {
        let mut status = self.require_status(task_id).await?;
        status.status = TaskState::InProgress;
        status.worker_id = Some(worker_id.to_owned());
        status.started_at = Some(OffsetDateTime::now_utc());
        self.write_status(&status).await?;
        Ok(())
    }

    /// `pending -> cancelled`, cooperative (`spec.md` §4.G, §8 scenario S6).
    /// Returns `false` (without mutating anything) once a worker has
    /// already claimed the task -- cancellation idempotence (`spec.md` §8
    /// #8) falls out of checking `status == Pending` on every call rather
    /// than a separate "already cancelled" flag.
    pub async fn cancel_task(&self, task_id: Uuid) -> Result<bool, QueueError> {
        let mut status = match self.get_task_status(task_id).await? {
            Some(status) => status,
            None => return Ok(false),
        };
        if status.status != TaskState::Pending {
            return Ok(false);
        }
        status.status = TaskState::Cancelled;
        status.completed_at = Some(OffsetDateTime::now_utc());
        self.write_status(&status).await?;
        Ok(true)
    }

    /// Merges a progress tick into the task record and writes the separate
    /// `progress:<id>` fan-out entry (`spec.md` §4.G).
    pub async fn update_task_progress(&self, task_id: Uuid, percentage: i32, current_step: Option<&str>) -> Result<(), QueueError> {
        let mut status = self.require_status(task_id).await?;
        status.progress_percentage = percentage.clamp(0, 100);
        status.current_step = current_step.map(str::to_owned);
        self.write_status(&status).await?;

        let update = ProgressUpdate {
            task_id,
            percentage: status.progress_percentage,
            current_step: status.current_step.clone(),
            updated_at: OffsetDateTime::now_utc(),
        };
        let payload = serde_json::to_string(&update).map_err(QueueTransportError::from)?;
        self.redis.setex(&progress_key(&task_id.to_string()), PROGRESS_TTL_SECS, &payload).await?;
        Ok(())
    }

    /// `in_progress -> completed | failed` (`spec.md` §4.G). Idempotent:
    /// a duplicate call simply overwrites the terminal record again
    /// (`spec.md` §8 #9, #10-adjacent "terminal status writes overwrite").
    pub async fn complete_task(&self, task_id: Uuid, outputs: Option<Value>, error: Option<String>) -> Result<(), QueueError> {
        let mut status = self.require_status(task_id).await?;
        status.status = if error.is_some() { TaskState::Failed } else { TaskState::Completed };
        status.outputs = outputs;
        status.error_message = error;
        status.progress_percentage = 100;
        status.completed_at = Some(OffsetDateTime::now_utc());
        self.write_status(&status).await?;
        Ok(())
    }

    /// Pops the next job for `queue_name`, blocking up to `timeout_secs`.
    pub async fn dequeue(&self, queue_name: &str, timeout_secs: f64) -> Result<Option<FlowJob>, QueueError> {
        match self.redis.dequeue_job(queue_name, timeout_secs).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw).map_err(QueueTransportError::from)?)),
            None => Ok(None),
        }
    }

    async fn require_status(&self, task_id: Uuid) -> Result<TaskStatus, QueueError> {
        self.get_task_status(task_id).await?.ok_or(QueueError::NotFound(task_id))
    }

    async fn write_status(&self, status: &TaskStatus) -> Result<(), QueueError> {
        let payload = serde_json::to_string(status).map_err(QueueTransportError::from)?;
        self.redis.setex(&task_key(&status.task_id.to_string()), TASK_TTL_SECS, &payload).await?;
        self.bump_queue_stats(&status.queue_name).await;
        Ok(())
    }

    /// Derived, best-effort aggregate (`spec.md` §4.G `queue:stats:<name>`
    /// "derived, not authoritative"); a failure here never surfaces to the
    /// caller since it is purely informational.
    async fn bump_queue_stats(&self, queue_name: &str) {
        let key = queue_stats_key(queue_name);
        let _ = self.redis.setex(&key, TASK_TTL_SECS, &OffsetDateTime::now_utc().unix_timestamp().to_string()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flow_job_round_trips_through_json() {
        let job = FlowJob {
            task_id: Uuid::new_v4(),
            flow_name: "demo".into(),
            flow_run_id: Some(Uuid::new_v4()),
            inputs: serde_json::json!({"a": 1}),
            user_id: None,
            task_type: "flow".into(),
        };
        let encoded = serde_json::to_string(&job).unwrap();
        let decoded: FlowJob = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.task_id, job.task_id);
        assert_eq!(decoded.flow_name, job.flow_name);
    }
}
