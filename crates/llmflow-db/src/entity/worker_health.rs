use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Durable mirror of the last-known worker status, written whenever a
/// worker transitions offline; in-flight heartbeats live only in Redis's
/// `worker:<id>` key (`SPEC_FULL.md` §4.G).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "worker_health")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub hostname: String,
    /// One of `idle`, `busy`, `offline`.
    pub status: String,
    pub last_heartbeat_at: TimeDateTimeWithTimeZone,
    pub registered_at: TimeDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
