//! Persistence for `flow_runs`/`flow_step_runs`, mirroring the shape of
//! `llmflow_ledger::Ledger` -- a thin `ConnectionTrait`-generic CRUD surface
//! with no session ownership of its own (`spec.md` §6).

use llmflow_db::entity::flow_runs::{ActiveModel as RunActiveModel, Column as RunColumn, Entity as RunEntity, Model as RunModel};
use llmflow_db::entity::flow_step_runs::{
    ActiveModel as StepActiveModel, Column as StepColumn, Entity as StepEntity, Model as StepModel,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, Set};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum FlowStoreError {
    #[error(transparent)]
    Db(#[from] DbErr),
    #[error("flow run {0} not found")]
    RunNotFound(Uuid),
    #[error("flow step run {0} not found")]
    StepNotFound(Uuid),
}

pub struct FlowStore;

impl FlowStore {
    /// `spec.md` §4.E `create_run`. `status` starts `running`: unlike the
    /// ledger's `pending` row (written before any I/O has even been
    /// attempted), a flow run is already executing its body by the time
    /// the caller can observe the row.
    pub async fn create_run<C: ConnectionTrait>(
        db: &C,
        flow_name: &str,
        inputs: Value,
        user_id: Option<Uuid>,
        execution_mode: &str,
        total_steps: Option<i32>,
    ) -> Result<Uuid, FlowStoreError> {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let model = RunActiveModel {
            id: Set(id),
            flow_name: Set(flow_name.to_owned()),
            user_id: Set(user_id),
            status: Set("running".to_owned()),
            execution_mode: Set(execution_mode.to_owned()),
            current_step: Set(None),
            step_progress: Set(0),
            total_steps: Set(total_steps),
            percentage: Set(0),
            total_tokens: Set(0),
            total_cost_estimate: Set(0.0),
            last_heartbeat: Set(Some(now.into())),
            inputs: Set(inputs),
            outputs: Set(None),
            error_message: Set(None),
            started_at: Set(now.into()),
            completed_at: Set(None),
        };
        model.insert(db).await?;
        Ok(id)
    }

    pub async fn complete_run<C: ConnectionTrait>(db: &C, run_id: Uuid, outputs: Value) -> Result<(), FlowStoreError> {
        let mut model: RunActiveModel = RunEntity::find_by_id(run_id).one(db).await?.ok_or(FlowStoreError::RunNotFound(run_id))?.into();
        model.status = Set("completed".to_owned());
        model.outputs = Set(Some(outputs));
        model.completed_at = Set(Some(OffsetDateTime::now_utc().into()));
        model.update(db).await?;
        Ok(())
    }

    pub async fn fail_run<C: ConnectionTrait>(db: &C, run_id: Uuid, error_message: &str) -> Result<(), FlowStoreError> {
        let mut model: RunActiveModel = RunEntity::find_by_id(run_id).one(db).await?.ok_or(FlowStoreError::RunNotFound(run_id))?.into();
        model.status = Set("failed".to_owned());
        model.error_message = Set(Some(error_message.to_owned()));
        model.completed_at = Set(Some(OffsetDateTime::now_utc().into()));
        model.update(db).await?;
        Ok(())
    }

    /// `spec.md` §8 invariant #3: a `cancelled` run has null `outputs` and
    /// non-null `completed_at`. Flow runs have no self-cancellation path
    /// (`spec.md` §4.G cancellation only reaches not-yet-claimed Task Queue
    /// entries); this exists so a queue-level cancellation can mark the
    /// flow run it never started.
    pub async fn cancel_run<C: ConnectionTrait>(db: &C, run_id: Uuid) -> Result<(), FlowStoreError> {
        let mut model: RunActiveModel = RunEntity::find_by_id(run_id).one(db).await?.ok_or(FlowStoreError::RunNotFound(run_id))?.into();
        model.status = Set("cancelled".to_owned());
        model.completed_at = Set(Some(OffsetDateTime::now_utc().into()));
        model.update(db).await?;
        Ok(())
    }

    /// Updates `current_step`/`step_progress`/`percentage` and the
    /// cumulative token/cost counters after a step completes.
    pub async fn update_progress<C: ConnectionTrait>(
        db: &C,
        run_id: Uuid,
        current_step: &str,
        step_progress: i32,
        tokens_delta: i32,
        cost_delta: f64,
    ) -> Result<(), FlowStoreError> {
        let row = RunEntity::find_by_id(run_id).one(db).await?.ok_or(FlowStoreError::RunNotFound(run_id))?;
        let percentage = match row.total_steps {
            Some(total) if total > 0 => ((step_progress as f64 / total as f64) * 100.0) as i32,
            _ => row.percentage,
        };

        let mut model: RunActiveModel = row.into();
        model.current_step = Set(Some(current_step.to_owned()));
        model.step_progress = Set(step_progress);
        model.percentage = Set(percentage);
        model.total_tokens = Set(model.total_tokens.take().unwrap_or(0) + tokens_delta);
        model.total_cost_estimate = Set(model.total_cost_estimate.take().unwrap_or(0.0) + cost_delta);
        model.last_heartbeat = Set(Some(OffsetDateTime::now_utc().into()));
        model.update(db).await?;
        Ok(())
    }

    pub async fn get_run<C: ConnectionTrait>(db: &C, run_id: Uuid) -> Result<Option<RunModel>, FlowStoreError> {
        Ok(RunEntity::find_by_id(run_id).one(db).await?)
    }

    pub async fn steps_for_run<C: ConnectionTrait>(db: &C, run_id: Uuid) -> Result<Vec<StepModel>, FlowStoreError> {
        Ok(StepEntity::find()
            .filter(StepColumn::FlowRunId.eq(run_id))
            .order_by_asc(StepColumn::StepOrder)
            .all(db)
            .await?)
    }

    /// Creates a `pending` step row at `step_order` -- the density invariant
    /// (`spec.md` §8 #2) is maintained by the caller passing
    /// `ExecutionContext::next_step_order()`, which only ever increments.
    pub async fn create_step<C: ConnectionTrait>(
        db: &C,
        flow_run_id: Uuid,
        step_name: &str,
        step_order: i32,
        step_kind: &str,
        inputs: Value,
    ) -> Result<Uuid, FlowStoreError> {
        let id = Uuid::new_v4();
        let model = StepActiveModel {
            id: Set(id),
            flow_run_id: Set(flow_run_id),
            step_name: Set(step_name.to_owned()),
            step_order: Set(step_order),
            step_kind: Set(step_kind.to_owned()),
            status: Set("pending".to_owned()),
            inputs: Set(inputs),
            outputs: Set(None),
            llm_request_id: Set(None),
            tokens_used: Set(None),
            cost_estimate: Set(None),
            execution_time_ms: Set(None),
            error_message: Set(None),
            started_at: Set(OffsetDateTime::now_utc().into()),
            completed_at: Set(None),
        };
        model.insert(db).await?;
        Ok(id)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn complete_step<C: ConnectionTrait>(
        db: &C,
        step_id: Uuid,
        outputs: Value,
        llm_request_id: Option<Uuid>,
        tokens_used: Option<i32>,
        cost_estimate: Option<f64>,
        execution_time_ms: i64,
    ) -> Result<(), FlowStoreError> {
        let mut model: StepActiveModel = StepEntity::find_by_id(step_id).one(db).await?.ok_or(FlowStoreError::StepNotFound(step_id))?.into();
        model.status = Set("completed".to_owned());
        model.outputs = Set(Some(outputs));
        model.llm_request_id = Set(llm_request_id);
        model.tokens_used = Set(tokens_used);
        model.cost_estimate = Set(cost_estimate);
        model.execution_time_ms = Set(Some(execution_time_ms));
        model.completed_at = Set(Some(OffsetDateTime::now_utc().into()));
        model.update(db).await?;
        Ok(())
    }

    pub async fn fail_step<C: ConnectionTrait>(db: &C, step_id: Uuid, error_message: &str, execution_time_ms: i64) -> Result<(), FlowStoreError> {
        let mut model: StepActiveModel = StepEntity::find_by_id(step_id).one(db).await?.ok_or(FlowStoreError::StepNotFound(step_id))?.into();
        model.status = Set("failed".to_owned());
        model.error_message = Set(Some(error_message.to_owned()));
        model.execution_time_ms = Set(Some(execution_time_ms));
        model.completed_at = Set(Some(OffsetDateTime::now_utc().into()));
        model.update(db).await?;
        Ok(())
    }
}
