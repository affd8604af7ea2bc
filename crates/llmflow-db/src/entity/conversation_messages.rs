use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "conversation_messages")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub conversation_id: Uuid,
    /// Dense, 1-based position within the conversation; enforced by
    /// `llmflow-conversation`'s transactional append, never by a DB
    /// constraint, since dense reassignment after a delete requires
    /// rewriting sibling rows.
    pub ordinal: i32,
    /// One of `system`, `user`, `assistant`, `tool`, `function`.
    pub role: String,
    #[sea_orm(column_type = "JsonBinary")]
    pub content: Json,
    pub llm_request_id: Option<Uuid>,
    pub tokens_used: Option<i32>,
    pub cost_estimate: Option<f64>,
    #[sea_orm(column_type = "JsonBinary")]
    pub metadata: Json,
    pub created_at: TimeDateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::conversations::Entity",
        from = "Column::ConversationId",
        to = "super::conversations::Column::Id"
    )]
    Conversation,
}

impl Related<super::conversations::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Conversation.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
