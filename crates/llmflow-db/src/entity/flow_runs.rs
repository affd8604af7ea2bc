use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "flow_runs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub flow_name: String,
    pub user_id: Option<Uuid>,
    /// One of `pending`, `running`, `completed`, `failed`, `cancelled`.
    pub status: String,
    /// One of `sync`, `background`.
    pub execution_mode: String,
    /// Name of the step currently running, if any.
    #[sea_orm(column_type = "Text", nullable)]
    pub current_step: Option<String>,
    /// Count of steps completed so far.
    pub step_progress: i32,
    /// Total steps declared by the flow, when known up front.
    pub total_steps: Option<i32>,
    /// `step_progress / total_steps * 100`, monotonic non-decreasing while running.
    pub percentage: i32,
    pub total_tokens: i32,
    pub total_cost_estimate: f64,
    pub last_heartbeat: Option<TimeDateTimeWithTimeZone>,
    #[sea_orm(column_type = "JsonBinary")]
    pub inputs: Json,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub outputs: Option<Json>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
    pub started_at: TimeDateTimeWithTimeZone,
    pub completed_at: Option<TimeDateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::flow_step_runs::Entity")]
    FlowStepRuns,
}

impl Related<super::flow_step_runs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FlowStepRuns.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
