//! The Conversation Engine (`SPEC_FULL.md` §4.F): append-only transcripts
//! bound to a `conversations` row, plus LLM-driven helpers (plain replies,
//! a serial tool-calling loop, structured replies) built on top of them.

pub mod context;
pub mod engine;
pub mod store;
pub mod tools;

pub use context::ConversationContext;
pub use engine::{ConversationEngine, ConversationEngineError};
pub use store::{ConversationStore, ConversationStoreError, ConversationWithMessages};
pub use tools::{ToolHandler, ToolRegistry};

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use llmflow_core::{ChatRequest, ChatResponse, FinishReason, ProviderAdapter, ProviderError, ProviderRegistry, ToolCall, ToolDefinition, Usage};
    use llmflow_db::DbHandle;
    use llmflow_migration::{Migrator, MigratorTrait};
    use llmflow_service::{LlmService, ServiceConfig};
    use serde_json::Value;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    /// First call emits a `get_weather` tool call; once it sees a matching
    /// tool-role message in the transcript it returns a final answer.
    struct WeatherAdapter {
        calls: AtomicU32,
    }

    #[async_trait]
    impl ProviderAdapter for WeatherAdapter {
        fn name(&self) -> &'static str {
            "weather-fake"
        }
        fn model_prefixes(&self) -> &'static [&'static str] {
            &["weather-"]
        }
        async fn generate_response(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            let call_number = self.calls.fetch_add(1, Ordering::SeqCst);
            if call_number == 0 {
                return Ok(ChatResponse {
                    text: String::new(),
                    tool_calls: vec![ToolCall { id: "call_1".into(), name: "get_weather".into(), arguments: serde_json::json!({"city": "nyc"}) }],
                    finish_reason: FinishReason::ToolCalls,
                    usage: Usage { input_tokens: 12, output_tokens: 4 },
                    raw: serde_json::json!({}),
                });
            }
            let _ = request;
            Ok(ChatResponse {
                text: "It's sunny in NYC.".into(),
                tool_calls: vec![],
                finish_reason: FinishReason::Stop,
                usage: Usage { input_tokens: 20, output_tokens: 6 },
                raw: serde_json::json!({}),
            })
        }
        fn estimate_cost(&self, _model: &str, usage: &Usage) -> f64 {
            usage.total() as f64 * 0.00001
        }
    }

    struct WeatherHandler;

    #[async_trait]
    impl ToolHandler for WeatherHandler {
        async fn execute(&self, _arguments: Value) -> Result<Value, anyhow::Error> {
            Ok(serde_json::json!({"forecast": "sunny"}))
        }
    }

    async fn engine() -> ConversationEngine {
        let db = DbHandle::connect("sqlite::memory:").await.unwrap();
        Migrator::up(db.connection(), None).await.unwrap();
        let registry = ProviderRegistry::new(vec![Arc::new(WeatherAdapter { calls: AtomicU32::new(0) })]);
        let cache_dir = std::env::temp_dir().join(format!("llmflow-conversation-test-{}", uuid::Uuid::new_v4()));
        let cache = llmflow_cache::ResponseCache::new(cache_dir, true, 24, 100);
        let service = Arc::new(LlmService::new(
            registry,
            cache,
            db.clone(),
            ServiceConfig { default_model: "weather-1".into(), ..ServiceConfig::default() },
        ));
        ConversationEngine::new(db, service)
    }

    /// Approximates scenario S1 from `spec.md` §8: one tool call round-trip
    /// before the model returns its final answer.
    #[tokio::test]
    async fn generate_with_tools_runs_the_tool_then_records_the_final_answer() {
        let engine = engine().await;
        let conversation = engine.create_conversation("support", None, None, None).await.unwrap();
        engine.record_user_message(conversation.id, "What's the weather in NYC?", None).await.unwrap();

        let registry = ToolRegistry::new().register(
            ToolDefinition { name: "get_weather".into(), description: "look up weather".into(), parameters: serde_json::json!({"type": "object"}) },
            Arc::new(WeatherHandler),
        );

        let (message, _request_id) = engine.generate_with_tools(conversation.id, None, None, &registry, 5).await.unwrap();
        assert_eq!(message.text(), "It's sunny in NYC.");

        let transcript = engine.get_message_history(conversation.id, None, true).await.unwrap();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript[0].role, "user");
        assert_eq!(transcript[1].role, "tool");
        assert_eq!(transcript[2].role, "assistant");
    }

    #[tokio::test]
    async fn bind_rejects_a_conversation_type_mismatch() {
        let engine = engine().await;
        let conversation = engine.create_conversation("support", None, None, None).await.unwrap();

        let err = engine.bind(conversation.id, "learning_coach", None).await.unwrap_err();
        assert!(matches!(err, ConversationEngineError::Execution(llmflow_core::ExecutionError::Provider(llmflow_core::ProviderError::ValidationError(_)))));
    }

    #[tokio::test]
    async fn build_llm_messages_prepends_an_optional_system_prompt() {
        let engine = engine().await;
        let conversation = engine.create_conversation("support", None, None, None).await.unwrap();
        engine.record_user_message(conversation.id, "hello", None).await.unwrap();

        let messages = engine.build_llm_messages(conversation.id, Some("be concise"), false).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].text(), "be concise");
        assert_eq!(messages[1].text(), "hello");
    }
}
