//! Durable mirror of terminal task/worker state (`DESIGN.md` OQ-1).
//! Redis (`queue.rs`/`workers.rs`) remains the source of truth for
//! in-flight claims, heartbeats and cancellation; this module exists only
//! so `tasks`/`worker_health` rows survive past their Redis TTL for the
//! admin read surface `spec.md` §6 names. Shape mirrors
//! `llmflow_flow::store::FlowStore`: a `ConnectionTrait`-generic CRUD
//! surface with no session ownership of its own.

use llmflow_db::entity::tasks::{ActiveModel as TaskActiveModel, Column as TaskColumn, Entity as TaskEntity, Model as TaskModel};
use llmflow_db::entity::worker_health::{ActiveModel as WorkerActiveModel, Column as WorkerColumn, Entity as WorkerEntity, Model as WorkerModel};
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, Set};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::model::{TaskStatus, WorkerHealth, WorkerState};

#[derive(Debug, thiserror::Error)]
pub enum TaskStoreError {
    #[error(transparent)]
    Db(#[from] DbErr),
}

pub struct TaskStore;

impl TaskStore {
    /// Upserts the durable row to match `status`'s current snapshot.
    /// Called once a task reaches a terminal state (`completed`/`failed`/
    /// `cancelled`); non-terminal writes are deliberately skipped so the
    /// table only ever holds outcomes, not a second copy of Redis's
    /// in-flight bookkeeping.
    pub async fn mirror_terminal<C: ConnectionTrait>(db: &C, status: &TaskStatus) -> Result<(), TaskStoreError> {
        if !status.status.is_terminal() {
            return Ok(());
        }

        let existing = TaskEntity::find_by_id(status.task_id).one(db).await?;
        let is_update = existing.is_some();
        let mut model: TaskActiveModel = match existing {
            Some(row) => row.into(),
            None => TaskActiveModel { id: Set(status.task_id), ..Default::default() },
        };

        model.id = Set(status.task_id);
        model.queue_name = Set(status.queue_name.clone());
        model.flow_name = Set(status.flow_name.clone());
        model.flow_run_id = Set(status.flow_run_id);
        model.user_id = Set(status.user_id);
        model.status = Set(status.status.as_str().to_owned());
        model.priority = Set(status.priority);
        model.retry_count = Set(status.retry_count);
        model.progress_percentage = Set(status.progress_percentage);
        model.worker_id = Set(status.worker_id.clone());
        model.error_message = Set(status.error_message.clone());
        model.submitted_at = Set(status.created_at.into());
        model.started_at = Set(status.started_at.map(Into::into));
        model.finished_at = Set(status.completed_at.map(Into::into));

        if is_update {
            model.update(db).await?;
        } else {
            model.insert(db).await?;
        }
        Ok(())
    }

    pub async fn by_id<C: ConnectionTrait>(db: &C, task_id: Uuid) -> Result<Option<TaskModel>, TaskStoreError> {
        Ok(TaskEntity::find_by_id(task_id).one(db).await?)
    }

    pub async fn recent<C: ConnectionTrait>(db: &C, limit: u64, offset: u64) -> Result<Vec<TaskModel>, TaskStoreError> {
        Ok(TaskEntity::find()
            .order_by_desc(TaskColumn::SubmittedAt)
            .limit(limit)
            .offset(offset)
            .all(db)
            .await?)
    }

    pub async fn by_status<C: ConnectionTrait>(db: &C, status: &str, limit: u64, offset: u64) -> Result<Vec<TaskModel>, TaskStoreError> {
        Ok(TaskEntity::find()
            .filter(TaskColumn::Status.eq(status))
            .order_by_desc(TaskColumn::SubmittedAt)
            .limit(limit)
            .offset(offset)
            .all(db)
            .await?)
    }
}

pub struct WorkerHealthStore;

impl WorkerHealthStore {
    /// Written once, on `mark_offline` (`spec.md` §4.G worker lifecycle
    /// step 4) -- a last-known-state snapshot, not a running heartbeat log.
    pub async fn mirror_offline<C: ConnectionTrait>(db: &C, health: &WorkerHealth) -> Result<(), TaskStoreError> {
        let worker_uuid = stable_worker_id(&health.worker_id);
        let existing = WorkerEntity::find_by_id(worker_uuid).one(db).await?;
        let is_update = existing.is_some();
        let mut model: WorkerActiveModel = match existing {
            Some(row) => row.into(),
            None => WorkerActiveModel { id: Set(worker_uuid), registered_at: Set(OffsetDateTime::now_utc().into()), ..Default::default() },
        };
        model.id = Set(worker_uuid);
        model.hostname = Set(health.host.clone());
        model.status = Set(WorkerState::Offline.as_str().to_owned());
        model.last_heartbeat_at = Set(health.last_heartbeat.into());

        if is_update {
            model.update(db).await?;
        } else {
            model.insert(db).await?;
        }
        Ok(())
    }

    pub async fn recent<C: ConnectionTrait>(db: &C, limit: u64) -> Result<Vec<WorkerModel>, TaskStoreError> {
        Ok(WorkerEntity::find().order_by_desc(WorkerColumn::LastHeartbeatAt).limit(limit).all(db).await?)
    }
}

/// `tasks.rs`/`worker_health.rs`'s entity primary keys are UUIDs, but a
/// worker's own `worker_id` is an operator-assigned string (e.g. a
/// hostname-derived slug, `spec.md` §4.G). Deriving a stable v5 UUID from
/// it keeps the durable row's primary key deterministic across restarts
/// without forcing worker ids themselves to be UUIDs.
fn stable_worker_id(worker_id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, worker_id.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskState;
    use llmflow_db::DbHandle;
    use llmflow_migration::{Migrator, MigratorTrait};

    async fn setup() -> DbHandle {
        let db = DbHandle::connect("sqlite::memory:").await.unwrap();
        Migrator::up(db.connection(), None).await.unwrap();
        db
    }

    fn sample_status(task_id: Uuid, state: TaskState) -> TaskStatus {
        TaskStatus {
            task_id,
            flow_name: "demo".into(),
            flow_run_id: None,
            status: state,
            inputs: serde_json::json!({}),
            outputs: Some(serde_json::json!({"ok": true})),
            progress_percentage: 100,
            current_step: None,
            worker_id: Some("worker-1".into()),
            queue_name: "flows".into(),
            priority: 0,
            retry_count: 0,
            user_id: None,
            error_message: None,
            created_at: OffsetDateTime::now_utc(),
            started_at: Some(OffsetDateTime::now_utc()),
            completed_at: Some(OffsetDateTime::now_utc()),
        }
    }

    #[tokio::test]
    async fn non_terminal_status_is_not_mirrored() {
        let db = setup().await;
        let task_id = Uuid::new_v4();
        TaskStore::mirror_terminal(db.connection(), &sample_status(task_id, TaskState::Pending)).await.unwrap();
        assert!(TaskStore::by_id(db.connection(), task_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn terminal_status_is_inserted_then_updated_in_place() {
        let db = setup().await;
        let task_id = Uuid::new_v4();

        TaskStore::mirror_terminal(db.connection(), &sample_status(task_id, TaskState::Completed)).await.unwrap();
        let row = TaskStore::by_id(db.connection(), task_id).await.unwrap().unwrap();
        assert_eq!(row.status, "completed");

        let mut retried = sample_status(task_id, TaskState::Failed);
        retried.error_message = Some("boom".into());
        TaskStore::mirror_terminal(db.connection(), &retried).await.unwrap();

        let row = TaskStore::by_id(db.connection(), task_id).await.unwrap().unwrap();
        assert_eq!(row.status, "failed");
        assert_eq!(row.error_message.as_deref(), Some("boom"));

        let all = TaskStore::recent(db.connection(), 10, 0).await.unwrap();
        assert_eq!(all.len(), 1, "the second mirror call must update, not duplicate, the row");
    }

    #[tokio::test]
    async fn worker_offline_snapshot_round_trips() {
        let db = setup().await;
        let health = WorkerHealth {
            worker_id: "worker-xyz".into(),
            status: WorkerState::Offline,
            last_heartbeat: OffsetDateTime::now_utc(),
            current_tasks: 0,
            total_processed: 4,
            queue_name: "flows".into(),
            host: "host-a".into(),
            pid: 1234,
            version: "0.1.0".into(),
        };
        WorkerHealthStore::mirror_offline(db.connection(), &health).await.unwrap();

        let rows = WorkerHealthStore::recent(db.connection(), 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].hostname, "host-a");
        assert_eq!(rows[0].status, "offline");
    }
}
