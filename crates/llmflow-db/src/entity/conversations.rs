use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "conversations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    /// Opaque caller-chosen tag (e.g. `"learning_coach"`); immutable after creation.
    pub conversation_type: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub title: Option<String>,
    /// One of `active`, `archived`, `closed`.
    pub status: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Json,
    /// Monotonic; always equal to the number of child messages.
    pub message_count: i32,
    pub last_message_at: Option<TimeDateTimeWithTimeZone>,
    pub created_at: TimeDateTimeWithTimeZone,
    pub updated_at: TimeDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::conversation_messages::Entity")]
    ConversationMessages,
}

impl Related<super::conversation_messages::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ConversationMessages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
