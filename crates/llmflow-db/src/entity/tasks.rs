use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Durable mirror of terminal task state (`DESIGN.md` OQ-1). Redis remains
/// the source of truth for in-flight claims, heartbeats, and cancellation;
/// this table exists only so task history survives the `task:<id>`
/// observation key's TTL.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub queue_name: String,
    pub flow_name: String,
    pub flow_run_id: Option<Uuid>,
    pub user_id: Option<Uuid>,
    /// One of `pending`, `in_progress`, `completed`, `failed`, `cancelled`, `retry`.
    pub status: String,
    pub priority: i32,
    pub retry_count: i32,
    pub progress_percentage: i32,
    #[sea_orm(column_type = "Text", nullable)]
    pub worker_id: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
    pub submitted_at: TimeDateTimeWithTimeZone,
    pub started_at: Option<TimeDateTimeWithTimeZone>,
    pub finished_at: Option<TimeDateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
