//! Wire shapes for the observation store (`spec.md` §3 `Task`/
//! `WorkerHealth`, §4.G). These are plain `serde` structs written as JSON
//! strings into Redis values -- there is no schema migration story for
//! them, matching a TTL'd cache rather than a durable table.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// The job payload carried on the queue transport itself (`spec.md` §4.G
/// submission step 2): everything a worker needs to reconstitute an
/// execution context and drive the Flow Engine as if it were a foreground
/// call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowJob {
    pub task_id: Uuid,
    pub flow_name: String,
    pub flow_run_id: Option<Uuid>,
    pub inputs: Value,
    pub user_id: Option<Uuid>,
    /// Selects the handler out of the worker's process-global registry
    /// (`spec.md` §4.G "job dispatch"); defaults to `"flow"` for the
    /// built-in flow-execution handler.
    pub task_type: String,
}

/// One of the statuses a `Task` can be in (`spec.md` §3 `Task`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
    Retry,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::InProgress => "in_progress",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
            TaskState::Retry => "retry",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed | TaskState::Cancelled)
    }
}

/// The `task:<id>` observation record (`spec.md` §3 `Task`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: Uuid,
    pub flow_name: String,
    pub flow_run_id: Option<Uuid>,
    pub status: TaskState,
    pub inputs: Value,
    pub outputs: Option<Value>,
    pub progress_percentage: i32,
    pub current_step: Option<String>,
    pub worker_id: Option<String>,
    pub queue_name: String,
    pub priority: i32,
    pub retry_count: i32,
    pub user_id: Option<Uuid>,
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

/// The separate `progress:<id>` fan-out record (`spec.md` §4.G), kept
/// distinct from `TaskStatus` so a progress subscriber does not have to
/// pull (and re-parse) the whole task record on every tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub task_id: Uuid,
    pub percentage: i32,
    pub current_step: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Worker status vocabulary (`spec.md` §3 `WorkerHealth`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Healthy,
    Busy,
    Idle,
    Unhealthy,
    Offline,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Healthy => "healthy",
            WorkerState::Busy => "busy",
            WorkerState::Idle => "idle",
            WorkerState::Unhealthy => "unhealthy",
            WorkerState::Offline => "offline",
        }
    }
}

/// The `worker:<id>` heartbeat record (`spec.md` §3 `WorkerHealth`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerHealth {
    pub worker_id: String,
    pub status: WorkerState,
    #[serde(with = "time::serde::rfc3339")]
    pub last_heartbeat: OffsetDateTime,
    pub current_tasks: i32,
    pub total_processed: u64,
    pub queue_name: String,
    pub host: String,
    pub pid: u32,
    pub version: String,
}

impl WorkerHealth {
    /// `spec.md` §3 `WorkerHealth` invariant: a worker is offline iff its
    /// last heartbeat is older than `ttl`.
    pub fn is_offline(&self, ttl: time::Duration, now: OffsetDateTime) -> bool {
        now - self.last_heartbeat > ttl
    }
}

/// What `submit_flow_task` hands back to the caller (`spec.md` §4.G step 4).
#[derive(Debug, Clone, Serialize)]
pub struct SubmitOutcome {
    pub task_id: Uuid,
    pub flow_run_id: Option<Uuid>,
    pub queue_name: String,
    pub estimated_delay_secs: u64,
    pub status: TaskState,
}
