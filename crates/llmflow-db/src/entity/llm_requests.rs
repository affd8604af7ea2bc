use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One row per provider call -- the Request Ledger's durable record.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "llm_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub provider: String,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<i32>,
    /// One of `pending`, `completed`, `failed`.
    pub status: String,
    /// Canonical `Vec<llmflow_core::Message>`, serialized.
    #[sea_orm(column_type = "JsonBinary")]
    pub messages: Json,
    #[sea_orm(column_type = "JsonBinary")]
    pub additional_params: Json,
    #[sea_orm(column_type = "JsonBinary")]
    pub request_payload: Json,
    #[sea_orm(column_type = "Text", nullable)]
    pub response_content: Option<String>,
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub response_raw: Option<Json>,
    pub input_tokens: Option<i32>,
    pub output_tokens: Option<i32>,
    pub cost_estimate: Option<f64>,
    /// One of `stop`, `length`, `content_filter`, `tool_calls`, `error`, `other`.
    #[sea_orm(column_type = "Text", nullable)]
    pub finish_reason: Option<String>,
    pub cached: bool,
    /// 1 for the first attempt the caller sees regardless of internal retries;
    /// incremented only when the underlying HTTP attempt itself was retried.
    pub retry_attempt: i32,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,
    /// One of the `ProviderError` taxonomy variant names.
    #[sea_orm(column_type = "Text", nullable)]
    pub error_type: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub provider_response_id: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub system_fingerprint: Option<String>,
    pub response_created_at: Option<TimeDateTimeWithTimeZone>,
    pub duration_ms: Option<i64>,
    pub created_at: TimeDateTimeWithTimeZone,
    pub completed_at: Option<TimeDateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
