use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "flow_step_runs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub flow_run_id: Uuid,
    pub step_name: String,
    /// Dense, 1-based position within the flow run, assigned under the
    /// same transaction as the row insert.
    pub step_order: i32,
    /// One of `unstructured`, `structured`, `image`, `audio` -- the tagged
    /// dispatch variant from `SPEC_FULL.md` §9 (REDESIGN FLAGS), not a
    /// step subclass name.
    pub step_kind: String,
    /// One of `pending`, `running`, `completed`, `failed`.
    pub status: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub inputs: Json,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub outputs: Option<Json>,
    pub llm_request_id: Option<Uuid>,
    pub tokens_used: Option<i32>,
    pub cost_estimate: Option<f64>,
    pub execution_time_ms: Option<i64>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
    pub started_at: TimeDateTimeWithTimeZone,
    pub completed_at: Option<TimeDateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::flow_runs::Entity",
        from = "Column::FlowRunId",
        to = "super::flow_runs::Column::Id"
    )]
    FlowRun,
}

impl Related<super::flow_runs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::FlowRun.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
