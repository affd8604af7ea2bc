//! The Request Ledger (`SPEC_FULL.md` §4.C): a single-table persistence
//! surface over `llmflow_db::entity::llm_requests`, written by every
//! provider call the `llmflow-service` façade makes.
//!
//! Every mutation here runs under whatever transaction the caller passes
//! in (a `&DatabaseTransaction` or the plain connection) -- the ledger
//! does not open or own a session, matching the "session provider"
//! contract in `spec.md` §6.

use llmflow_core::{ChatRequest, ChatResponse, FinishReason, ProviderError};
use llmflow_db::entity::llm_requests::{ActiveModel, Column, Entity, Model};
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error(transparent)]
    Db(#[from] DbErr),
    #[error("llm request {0} not found")]
    NotFound(Uuid),
}

/// Everything known about a call before it is dispatched to a provider.
pub struct NewRequest<'a> {
    pub user_id: Option<Uuid>,
    pub provider: &'a str,
    pub request: &'a ChatRequest,
    pub additional_params: serde_json::Value,
}

fn finish_reason_str(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop => "stop",
        FinishReason::Length => "length",
        FinishReason::ContentFilter => "content_filter",
        FinishReason::ToolCalls => "tool_calls",
        FinishReason::Error => "error",
        FinishReason::Other => "other",
    }
}

/// One durable row per logical provider call.
pub struct Ledger;

impl Ledger {
    /// Inserts a `pending` row before any network I/O. Its generated `id`
    /// becomes the request id returned to callers (`spec.md` §4.B step 1).
    pub async fn create<C: ConnectionTrait>(db: &C, new: NewRequest<'_>) -> Result<Uuid, LedgerError> {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();

        let model = ActiveModel {
            id: Set(id),
            user_id: Set(new.user_id),
            provider: Set(new.provider.to_owned()),
            model: Set(new.request.model.clone()),
            temperature: Set(new.request.temperature),
            max_output_tokens: Set(new.request.max_tokens.map(|v| v as i32)),
            status: Set("pending".to_owned()),
            messages: Set(serde_json::to_value(&new.request.messages).unwrap_or(serde_json::Value::Null)),
            additional_params: Set(new.additional_params),
            request_payload: Set(serde_json::to_value(new.request).unwrap_or(serde_json::Value::Null)),
            response_content: Set(None),
            response_raw: Set(None),
            input_tokens: Set(None),
            output_tokens: Set(None),
            cost_estimate: Set(None),
            finish_reason: Set(None),
            cached: Set(false),
            retry_attempt: Set(1),
            error_message: Set(None),
            error_type: Set(None),
            provider_response_id: Set(None),
            system_fingerprint: Set(None),
            response_created_at: Set(None),
            duration_ms: Set(None),
            created_at: Set(now.into()),
            completed_at: Set(None),
        };
        model.insert(db).await?;
        Ok(id)
    }

    /// Terminal success transition: response content, tokens, cost, and
    /// timing are written back and `status` becomes `completed`.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_success<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        response: &ChatResponse,
        cost_estimate: f64,
        cached: bool,
        duration_ms: i64,
        retry_attempt: u32,
    ) -> Result<(), LedgerError> {
        let mut model: ActiveModel = Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or(LedgerError::NotFound(id))?
            .into();

        model.status = Set("completed".to_owned());
        model.response_content = Set(Some(response.text.clone()));
        model.response_raw = Set(Some(response.raw.clone()));
        model.input_tokens = Set(Some(response.usage.input_tokens as i32));
        model.output_tokens = Set(Some(response.usage.output_tokens as i32));
        model.cost_estimate = Set(Some(cost_estimate));
        model.finish_reason = Set(Some(finish_reason_str(response.finish_reason).to_owned()));
        model.cached = Set(cached);
        model.retry_attempt = Set(retry_attempt as i32);
        model.duration_ms = Set(Some(duration_ms));
        model.completed_at = Set(Some(OffsetDateTime::now_utc().into()));
        model.update(db).await?;
        Ok(())
    }

    /// Terminal failure transition: `error_message`/`error_type` populated,
    /// `status` becomes `failed`.
    pub async fn update_error<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
        error: &ProviderError,
        duration_ms: i64,
        retry_attempt: u32,
    ) -> Result<(), LedgerError> {
        let mut model: ActiveModel = Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or(LedgerError::NotFound(id))?
            .into();

        model.status = Set("failed".to_owned());
        model.error_message = Set(Some(error.to_string()));
        model.error_type = Set(Some(error.type_name().to_owned()));
        model.retry_attempt = Set(retry_attempt as i32);
        model.duration_ms = Set(Some(duration_ms));
        model.completed_at = Set(Some(OffsetDateTime::now_utc().into()));
        model.update(db).await?;
        Ok(())
    }

    /// Idempotent late-binding of ownership: a second call with the same
    /// `user_id` is a no-op write, satisfying the "user attribution
    /// idempotence" testable property (`spec.md` §8.10).
    pub async fn assign_user<C: ConnectionTrait>(db: &C, id: Uuid, user_id: Uuid) -> Result<(), LedgerError> {
        Entity::update_many()
            .col_expr(Column::UserId, Expr::value(user_id))
            .filter(Column::Id.eq(id))
            .exec(db)
            .await?;
        Ok(())
    }

    pub async fn by_id<C: ConnectionTrait>(db: &C, id: Uuid) -> Result<Option<Model>, LedgerError> {
        Ok(Entity::find_by_id(id).one(db).await?)
    }

    pub async fn by_user<C: ConnectionTrait>(db: &C, user_id: Uuid, limit: u64, offset: u64) -> Result<Vec<Model>, LedgerError> {
        Ok(Entity::find()
            .filter(Column::UserId.eq(user_id))
            .order_by_desc(Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(db)
            .await?)
    }

    pub async fn by_status<C: ConnectionTrait>(db: &C, status: &str, limit: u64, offset: u64) -> Result<Vec<Model>, LedgerError> {
        Ok(Entity::find()
            .filter(Column::Status.eq(status))
            .order_by_desc(Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(db)
            .await?)
    }

    pub async fn by_provider<C: ConnectionTrait>(db: &C, provider: &str, limit: u64, offset: u64) -> Result<Vec<Model>, LedgerError> {
        Ok(Entity::find()
            .filter(Column::Provider.eq(provider))
            .order_by_desc(Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(db)
            .await?)
    }

    pub async fn recent<C: ConnectionTrait>(db: &C, limit: u64, offset: u64) -> Result<Vec<Model>, LedgerError> {
        Ok(Entity::find()
            .order_by_desc(Column::CreatedAt)
            .limit(limit)
            .offset(offset)
            .all(db)
            .await?)
    }

    pub async fn count_all<C: ConnectionTrait>(db: &C) -> Result<u64, LedgerError> {
        Ok(Entity::find().count(db).await?)
    }

    pub async fn count_by_user<C: ConnectionTrait>(db: &C, user_id: Uuid) -> Result<u64, LedgerError> {
        Ok(Entity::find().filter(Column::UserId.eq(user_id)).count(db).await?)
    }

    pub async fn count_by_status<C: ConnectionTrait>(db: &C, status: &str) -> Result<u64, LedgerError> {
        Ok(Entity::find().filter(Column::Status.eq(status)).count(db).await?)
    }
}

/// Re-exported so callers that only need to read ledger rows don't have to
/// depend on `llmflow-db` directly for the model type.
pub use llmflow_db::entity::llm_requests::Model as LlmRequestRow;

#[cfg(test)]
mod tests {
    use super::*;
    use llmflow_core::{ChatRequest, FinishReason, Message, Usage};
    use llmflow_db::DbHandle;
    use llmflow_migration::{Migrator, MigratorTrait};

    async fn setup() -> DbHandle {
        let db = DbHandle::connect("sqlite::memory:").await.unwrap();
        Migrator::up(db.connection(), None).await.unwrap();
        db
    }

    fn sample_request() -> ChatRequest {
        ChatRequest::new("gpt-4o-mini", vec![Message::user("hi")])
    }

    #[tokio::test]
    async fn create_then_update_success_round_trips() {
        let db = setup().await;
        let id = Ledger::create(
            db.connection(),
            NewRequest { user_id: None, provider: "openai", request: &sample_request(), additional_params: serde_json::json!({}) },
        )
        .await
        .unwrap();

        let row = Ledger::by_id(db.connection(), id).await.unwrap().unwrap();
        assert_eq!(row.status, "pending");

        let response = ChatResponse {
            text: "hello".into(),
            tool_calls: vec![],
            finish_reason: FinishReason::Stop,
            usage: Usage { input_tokens: 5, output_tokens: 3 },
            raw: serde_json::json!({}),
        };
        Ledger::update_success(db.connection(), id, &response, 0.001, false, 120, 1).await.unwrap();

        let row = Ledger::by_id(db.connection(), id).await.unwrap().unwrap();
        assert_eq!(row.status, "completed");
        assert_eq!(row.response_content.as_deref(), Some("hello"));
        assert_eq!(row.input_tokens, Some(5));
    }

    #[tokio::test]
    async fn update_error_sets_failed_status_and_taxonomy() {
        let db = setup().await;
        let id = Ledger::create(
            db.connection(),
            NewRequest { user_id: None, provider: "openai", request: &sample_request(), additional_params: serde_json::json!({}) },
        )
        .await
        .unwrap();

        let err = ProviderError::AuthenticationError("bad key".into());
        Ledger::update_error(db.connection(), id, &err, 50, 1).await.unwrap();

        let row = Ledger::by_id(db.connection(), id).await.unwrap().unwrap();
        assert_eq!(row.status, "failed");
        assert_eq!(row.error_type.as_deref(), Some("authentication_error"));
    }

    #[tokio::test]
    async fn assign_user_is_idempotent() {
        let db = setup().await;
        let id = Ledger::create(
            db.connection(),
            NewRequest { user_id: None, provider: "openai", request: &sample_request(), additional_params: serde_json::json!({}) },
        )
        .await
        .unwrap();

        let user_id = Uuid::new_v4();
        Ledger::assign_user(db.connection(), id, user_id).await.unwrap();
        Ledger::assign_user(db.connection(), id, user_id).await.unwrap();

        let row = Ledger::by_id(db.connection(), id).await.unwrap().unwrap();
        assert_eq!(row.user_id, Some(user_id));
    }
}
