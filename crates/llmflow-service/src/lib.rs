//! The LLM Service (`SPEC_FULL.md` §4.D): the canonical façade every other
//! component (Flow Engine, Conversation Engine, Task Queue handlers) calls
//! instead of talking to a provider adapter directly.
//!
//! Ledger row creation, cache lookup, retry/backoff and response
//! normalization are centralized here rather than duplicated per adapter
//! -- the REDESIGN FLAGS deviation `SPEC_FULL.md` §4.B calls for. An
//! adapter's only job is to speak one vendor's wire protocol.

mod config;
mod structured;

pub use config::{ServiceConfig, ServiceError};
pub use structured::StructuredUsage;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;

use llmflow_core::{
    call_with_retry, AudioRequest, AudioResponse, ChatRequest, ChatResponse, FinishReason,
    ImageRequest, ImageResponse, Message, ProviderRegistry, RetryPolicy, Usage,
};
use llmflow_db::DbHandle;
use llmflow_ledger::{Ledger, LlmRequestRow, NewRequest};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

/// The canonical façade described in `spec.md` §4.D.
pub struct LlmService {
    registry: ProviderRegistry,
    cache: llmflow_cache::ResponseCache,
    db: DbHandle,
    retry_policy: RetryPolicy,
    config: ServiceConfig,
}

impl LlmService {
    pub fn new(registry: ProviderRegistry, cache: llmflow_cache::ResponseCache, db: DbHandle, config: ServiceConfig) -> Self {
        LlmService {
            registry,
            cache,
            db,
            retry_policy: RetryPolicy {
                max_retries: config.max_retries,
                default_wait_secs: config.retry_base_wait_secs,
                backoff_multiplier: 2.0,
            },
            config,
        }
    }

    fn resolve_model<'a>(&'a self, model: Option<&'a str>) -> &'a str {
        model.unwrap_or(&self.config.default_model)
    }

    /// Builds the canonical request and applies the service's configured
    /// defaults for anything the caller left unset.
    fn build_request(
        &self,
        messages: Vec<Message>,
        model: Option<&str>,
        temperature: Option<f32>,
        max_output_tokens: Option<u32>,
        extra: HashMap<String, Value>,
    ) -> ChatRequest {
        let mut request = ChatRequest::new(self.resolve_model(model), messages);
        request.temperature = temperature.or(self.config.default_temperature);
        request.max_tokens = max_output_tokens.or(self.config.default_max_output_tokens);
        request.extra = extra;
        request
    }

    /// `spec.md` §4.D: `generate_response`. Consults the cache, dispatches
    /// to the provider adapter selected by model prefix with retry, and
    /// writes the outcome back to the ledger regardless of cache hit/miss.
    #[instrument(name = "llmflow.service.generate_response", skip(self, messages, extra))]
    pub async fn generate_response(
        &self,
        messages: Vec<Message>,
        user_id: Option<Uuid>,
        model: Option<&str>,
        temperature: Option<f32>,
        max_output_tokens: Option<u32>,
        extra: HashMap<String, Value>,
    ) -> Result<(ChatResponse, Uuid), ServiceError> {
        let request = self.build_request(messages, model, temperature, max_output_tokens, extra);
        let adapter = self.registry.resolve(&request.model)?;

        let request_id = Ledger::create(
            self.db.connection(),
            NewRequest {
                user_id,
                provider: adapter.name(),
                request: &request,
                additional_params: serde_json::to_value(&request.extra).unwrap_or(Value::Null),
            },
        )
        .await?;

        if let Some(cached) = self.cache.get(&request).await {
            let cost = adapter.estimate_cost(&request.model, &cached.usage);
            Ledger::update_success(self.db.connection(), request_id, &cached, cost, true, 0, 1).await?;
            if let Some(user_id) = user_id {
                Ledger::assign_user(self.db.connection(), request_id, user_id).await?;
            }
            return Ok((cached, request_id));
        }

        let started = Instant::now();
        let attempts = AtomicU32::new(0);
        let cancel_token = CancellationToken::new();

        let result = call_with_retry(&self.retry_policy, &cancel_token, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            let adapter = &adapter;
            let request = &request;
            async move { adapter.generate_response(request).await }
        })
        .await;

        let elapsed_ms = started.elapsed().as_millis() as i64;
        let retry_attempt = attempts.load(Ordering::SeqCst).max(1);

        match result {
            Ok(response) => {
                let cost = adapter.estimate_cost(&request.model, &response.usage);
                Ledger::update_success(self.db.connection(), request_id, &response, cost, false, elapsed_ms, retry_attempt).await?;
                self.cache.set(&request, &response).await;
                if let Some(user_id) = user_id {
                    Ledger::assign_user(self.db.connection(), request_id, user_id).await?;
                }
                Ok((response, request_id))
            }
            Err(err) => {
                Ledger::update_error(self.db.connection(), request_id, &err, elapsed_ms, retry_attempt).await?;
                Err(err.into())
            }
        }
    }

    /// `spec.md` §4.D: `generate_structured_response`. Delegates to
    /// `generate_response` with a JSON-Schema-constrained request, then
    /// parses and validates the returned text as `T`.
    pub async fn generate_structured_response<T>(
        &self,
        messages: Vec<Message>,
        user_id: Option<Uuid>,
        model: Option<&str>,
        temperature: Option<f32>,
        max_output_tokens: Option<u32>,
    ) -> Result<(T, Uuid, StructuredUsage), ServiceError>
    where
        T: DeserializeOwned + schemars::JsonSchema,
    {
        structured::generate_structured_response(self, messages, user_id, model, temperature, max_output_tokens).await
    }

    /// Like `generate_structured_response`, but for callers that only have
    /// a runtime JSON Schema and no corresponding Rust type to deserialize
    /// into (the Flow Engine's `Structured` step kind, `spec.md` §4.E,
    /// whose schema comes from a flow definition rather than a type
    /// parameter). Returns the raw `ChatResponse`; the caller validates and
    /// parses its `text` itself.
    pub async fn generate_response_with_structured_output(
        &self,
        messages: Vec<Message>,
        user_id: Option<Uuid>,
        model: Option<&str>,
        temperature: Option<f32>,
        max_output_tokens: Option<u32>,
        spec: llmflow_core::StructuredOutputSpec,
    ) -> Result<(ChatResponse, Uuid), ServiceError> {
        let mut request = self.build_request(messages, model, temperature, max_output_tokens, HashMap::new());
        request.structured_output = Some(spec);
        let adapter = self.registry.resolve(&request.model)?;

        let request_id = Ledger::create(
            self.db.connection(),
            NewRequest { user_id, provider: adapter.name(), request: &request, additional_params: Value::Null },
        )
        .await?;

        let started = Instant::now();
        let attempts = AtomicU32::new(0);
        let cancel_token = CancellationToken::new();

        let result = call_with_retry(&self.retry_policy, &cancel_token, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            let adapter = &adapter;
            let request = &request;
            async move { adapter.generate_response(request).await }
        })
        .await;

        let elapsed_ms = started.elapsed().as_millis() as i64;
        let retry_attempt = attempts.load(Ordering::SeqCst).max(1);

        match result {
            Ok(response) => {
                let cost = adapter.estimate_cost(&request.model, &response.usage);
                Ledger::update_success(self.db.connection(), request_id, &response, cost, false, elapsed_ms, retry_attempt).await?;
                if let Some(user_id) = user_id {
                    Ledger::assign_user(self.db.connection(), request_id, user_id).await?;
                }
                Ok((response, request_id))
            }
            Err(err) => {
                Ledger::update_error(self.db.connection(), request_id, &err, elapsed_ms, retry_attempt).await?;
                Err(err.into())
            }
        }
    }

    /// Like `generate_response`, but carrying tool definitions so the
    /// Conversation Engine's tool-calling loop (`spec.md` §4.F) can offer
    /// them to the model. A normalized `ChatResponse.tool_calls` is how the
    /// caller learns the model wants to invoke one; there is no separate
    /// provider-facing method, since every adapter already speaks tools
    /// through the one `generate_response` entry point.
    #[allow(clippy::too_many_arguments)]
    pub async fn generate_response_with_tools(
        &self,
        messages: Vec<Message>,
        user_id: Option<Uuid>,
        model: Option<&str>,
        temperature: Option<f32>,
        max_output_tokens: Option<u32>,
        tools: Vec<llmflow_core::ToolDefinition>,
        tool_choice: Option<llmflow_core::ToolChoice>,
    ) -> Result<(ChatResponse, Uuid), ServiceError> {
        let mut request = self.build_request(messages, model, temperature, max_output_tokens, HashMap::new());
        request.tools = tools;
        request.tool_choice = tool_choice;
        let adapter = self.registry.resolve(&request.model)?;

        let request_id = Ledger::create(
            self.db.connection(),
            NewRequest { user_id, provider: adapter.name(), request: &request, additional_params: Value::Null },
        )
        .await?;

        let started = Instant::now();
        let attempts = AtomicU32::new(0);
        let cancel_token = CancellationToken::new();

        let result = call_with_retry(&self.retry_policy, &cancel_token, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            let adapter = &adapter;
            let request = &request;
            async move { adapter.generate_response(request).await }
        })
        .await;

        let elapsed_ms = started.elapsed().as_millis() as i64;
        let retry_attempt = attempts.load(Ordering::SeqCst).max(1);

        match result {
            Ok(response) => {
                let cost = adapter.estimate_cost(&request.model, &response.usage);
                Ledger::update_success(self.db.connection(), request_id, &response, cost, false, elapsed_ms, retry_attempt).await?;
                if let Some(user_id) = user_id {
                    Ledger::assign_user(self.db.connection(), request_id, user_id).await?;
                }
                Ok((response, request_id))
            }
            Err(err) => {
                Ledger::update_error(self.db.connection(), request_id, &err, elapsed_ms, retry_attempt).await?;
                Err(err.into())
            }
        }
    }

    /// `spec.md` §4.D: `generate_image`. Ledger rows for image/audio calls
    /// carry a synthetic single-user-message `ChatRequest` so the admin
    /// read surface (`get_request` et al.) has one uniform shape to query
    /// regardless of call kind.
    pub async fn generate_image(
        &self,
        prompt: &str,
        user_id: Option<Uuid>,
        size: Option<String>,
        quality: Option<String>,
        style: Option<String>,
        model: Option<&str>,
    ) -> Result<(ImageResponse, Uuid), ServiceError> {
        let model = self.resolve_model(model).to_owned();
        let adapter = self.registry.resolve(&model)?;
        let synthetic = ChatRequest::new(model.clone(), vec![Message::user(prompt)]);

        let request_id = Ledger::create(
            self.db.connection(),
            NewRequest { user_id, provider: adapter.name(), request: &synthetic, additional_params: Value::Null },
        )
        .await?;

        let image_request = ImageRequest { prompt: prompt.to_owned(), size, quality, style };
        match adapter.generate_image(&image_request).await {
            Ok(response) => {
                let summary = ChatResponse {
                    text: format!("{} image(s) generated", response.images.len()),
                    tool_calls: vec![],
                    finish_reason: FinishReason::Stop,
                    usage: Usage::default(),
                    raw: response.raw.clone(),
                };
                Ledger::update_success(self.db.connection(), request_id, &summary, 0.0, false, 0, 1).await?;
                if let Some(user_id) = user_id {
                    Ledger::assign_user(self.db.connection(), request_id, user_id).await?;
                }
                Ok((response, request_id))
            }
            Err(err) => {
                Ledger::update_error(self.db.connection(), request_id, &err, 0, 1).await?;
                Err(err.into())
            }
        }
    }

    /// `spec.md` §4.D: `generate_audio`.
    pub async fn generate_audio(
        &self,
        text: &str,
        voice: &str,
        user_id: Option<Uuid>,
        model: Option<&str>,
        format: Option<String>,
        speed: Option<f32>,
    ) -> Result<(AudioResponse, Uuid), ServiceError> {
        let model = self.resolve_model(model).to_owned();
        let adapter = self.registry.resolve(&model)?;
        let synthetic = ChatRequest::new(model.clone(), vec![Message::user(text)]);

        let request_id = Ledger::create(
            self.db.connection(),
            NewRequest { user_id, provider: adapter.name(), request: &synthetic, additional_params: Value::Null },
        )
        .await?;

        let audio_request = AudioRequest { text: text.to_owned(), voice: voice.to_owned(), format, speed };
        match adapter.generate_audio(&audio_request).await {
            Ok(response) => {
                let summary = ChatResponse {
                    text: format!("{} bytes of {} audio generated", response.audio.len(), response.mime_type),
                    tool_calls: vec![],
                    finish_reason: FinishReason::Stop,
                    usage: Usage::default(),
                    raw: serde_json::Value::Null,
                };
                Ledger::update_success(self.db.connection(), request_id, &summary, 0.0, false, 0, 1).await?;
                if let Some(user_id) = user_id {
                    Ledger::assign_user(self.db.connection(), request_id, user_id).await?;
                }
                Ok((response, request_id))
            }
            Err(err) => {
                Ledger::update_error(self.db.connection(), request_id, &err, 0, 1).await?;
                Err(err.into())
            }
        }
    }

    /// `spec.md` §4.D: `estimate_cost`. Approximates token counts as
    /// `floor(total_chars / 4)` for the prompt and `prompt / 4` for the
    /// completion, then delegates to the resolved adapter's rate table.
    pub fn estimate_cost(&self, messages: &[Message], model: Option<&str>) -> Result<f64, ServiceError> {
        let model = self.resolve_model(model);
        let adapter = self.registry.resolve(model)?;

        let total_chars: usize = messages.iter().map(|m| m.text().chars().count()).sum();
        let prompt_tokens = (total_chars / 4) as u32;
        let completion_tokens = prompt_tokens / 4;

        Ok(adapter.estimate_cost(model, &llmflow_core::Usage { input_tokens: prompt_tokens, output_tokens: completion_tokens }))
    }

    pub async fn get_request(&self, id: Uuid) -> Result<Option<LlmRequestRow>, ServiceError> {
        Ok(Ledger::by_id(self.db.connection(), id).await?)
    }

    pub async fn get_user_requests(&self, user_id: Uuid, limit: u64, offset: u64) -> Result<Vec<LlmRequestRow>, ServiceError> {
        Ok(Ledger::by_user(self.db.connection(), user_id, limit, offset).await?)
    }

    pub async fn get_recent_requests(&self, limit: u64, offset: u64) -> Result<Vec<LlmRequestRow>, ServiceError> {
        Ok(Ledger::recent(self.db.connection(), limit, offset).await?)
    }

    pub async fn count_all_requests(&self) -> Result<u64, ServiceError> {
        Ok(Ledger::count_all(self.db.connection()).await?)
    }

    pub async fn count_by_user(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        Ok(Ledger::count_by_user(self.db.connection(), user_id).await?)
    }

    pub async fn count_by_status(&self, status: &str) -> Result<u64, ServiceError> {
        Ok(Ledger::count_by_status(self.db.connection(), status).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmflow_core::{FinishReason, ProviderAdapter, ProviderError, Usage};
    use llmflow_migration::{Migrator, MigratorTrait};
    use schemars::JsonSchema;
    use serde::{Deserialize, Serialize};
    use std::sync::atomic::AtomicU32 as Counter;
    use std::sync::Arc;

    /// Fails `fail_times` calls with a retryable timeout before succeeding,
    /// so tests can assert the ledger's `retry_attempt` column advances.
    struct FakeAdapter {
        calls: Counter,
        fail_times: u32,
    }

    #[async_trait::async_trait]
    impl ProviderAdapter for FakeAdapter {
        fn name(&self) -> &'static str {
            "fake"
        }
        fn model_prefixes(&self) -> &'static [&'static str] {
            &["fake-"]
        }
        async fn generate_response(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_times {
                return Err(ProviderError::TimeoutError("simulated timeout".into()));
            }
            Ok(ChatResponse {
                text: format!("echo: {}", request.messages.last().map(|m| m.text()).unwrap_or_default()),
                tool_calls: vec![],
                finish_reason: FinishReason::Stop,
                usage: Usage { input_tokens: 10, output_tokens: 5 },
                raw: serde_json::json!({}),
            })
        }
        fn estimate_cost(&self, _model: &str, usage: &Usage) -> f64 {
            usage.total() as f64 * 0.0001
        }
    }

    async fn service_with(fail_times: u32, cache_dir: &std::path::Path) -> LlmService {
        let db = DbHandle::connect("sqlite::memory:").await.unwrap();
        Migrator::up(db.connection(), None).await.unwrap();
        let registry = ProviderRegistry::new(vec![Arc::new(FakeAdapter { calls: Counter::new(0), fail_times })]);
        let cache = llmflow_cache::ResponseCache::new(cache_dir, true, 24, 100);
        LlmService::new(
            registry,
            cache,
            db,
            ServiceConfig { default_model: "fake-1".into(), retry_base_wait_secs: 0, ..ServiceConfig::default() },
        )
    }

    #[tokio::test]
    async fn generate_response_writes_a_completed_ledger_row() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(0, dir.path()).await;

        let (response, id) = service
            .generate_response(vec![Message::user("hi")], None, None, None, None, HashMap::new())
            .await
            .unwrap();

        assert_eq!(response.text, "echo: hi");
        let row = service.get_request(id).await.unwrap().unwrap();
        assert_eq!(row.status, "completed");
        assert_eq!(row.retry_attempt, 1);
    }

    #[tokio::test]
    async fn retry_then_success_records_attempt_count() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(1, dir.path()).await;

        let (_response, id) = service
            .generate_response(vec![Message::user("retry me")], None, None, None, None, HashMap::new())
            .await
            .unwrap();

        let row = service.get_request(id).await.unwrap().unwrap();
        assert_eq!(row.status, "completed");
        assert_eq!(row.retry_attempt, 2);
    }

    #[tokio::test]
    async fn second_identical_call_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(0, dir.path()).await;

        let (_first, first_id) = service
            .generate_response(vec![Message::user("cache me")], None, None, None, None, HashMap::new())
            .await
            .unwrap();
        let (_second, second_id) = service
            .generate_response(vec![Message::user("cache me")], None, None, None, None, HashMap::new())
            .await
            .unwrap();

        assert_ne!(first_id, second_id);
        let second_row = service.get_request(second_id).await.unwrap().unwrap();
        assert!(second_row.cached);
    }

    #[tokio::test]
    async fn assigning_a_user_updates_the_ledger_row() {
        let dir = tempfile::tempdir().unwrap();
        let service = service_with(0, dir.path()).await;
        let user_id = Uuid::new_v4();

        let (_response, id) = service
            .generate_response(vec![Message::user("hi")], Some(user_id), None, None, None, HashMap::new())
            .await
            .unwrap();

        let row = service.get_request(id).await.unwrap().unwrap();
        assert_eq!(row.user_id, Some(user_id));
        assert_eq!(service.count_by_user(user_id).await.unwrap(), 1);
    }

    #[derive(Debug, Serialize, Deserialize, JsonSchema, PartialEq)]
    struct Greeting {
        message: String,
    }

    #[tokio::test]
    async fn generate_structured_response_parses_the_model_reply() {
        let dir = tempfile::tempdir().unwrap();
        let db = DbHandle::connect("sqlite::memory:").await.unwrap();
        Migrator::up(db.connection(), None).await.unwrap();

        struct JsonAdapter;
        #[async_trait::async_trait]
        impl ProviderAdapter for JsonAdapter {
            fn name(&self) -> &'static str {
                "json-fake"
            }
            fn model_prefixes(&self) -> &'static [&'static str] {
                &["fake-"]
            }
            async fn generate_response(&self, _request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
                Ok(ChatResponse {
                    text: serde_json::json!({"message": "hello"}).to_string(),
                    tool_calls: vec![],
                    finish_reason: FinishReason::Stop,
                    usage: Usage { input_tokens: 3, output_tokens: 2 },
                    raw: serde_json::json!({}),
                })
            }
            fn estimate_cost(&self, _model: &str, _usage: &Usage) -> f64 {
                0.0
            }
        }

        let registry = ProviderRegistry::new(vec![Arc::new(JsonAdapter)]);
        let cache = llmflow_cache::ResponseCache::new(dir.path(), true, 24, 100);
        let service = LlmService::new(registry, cache, db, ServiceConfig { default_model: "fake-1".into(), ..ServiceConfig::default() });

        let (greeting, _id, usage): (Greeting, Uuid, StructuredUsage) =
            service.generate_structured_response(vec![Message::user("greet me")], None, None, None, None).await.unwrap();

        assert_eq!(greeting, Greeting { message: "hello".into() });
        assert_eq!(usage.input_tokens, 3);
    }
}
