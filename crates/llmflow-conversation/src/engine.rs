//! The Conversation Engine façade (`spec.md` §4.F): transcript helpers plus
//! the LLM-driven operations built on top of them. Grounded on the
//! teacher's session loop for the "bind a context, drive the model, record
//! the turn" shape; the tool-calling loop mirrors
//! `agent::session`'s serial tool dispatch with exceptions folded into the
//! tool result rather than propagated.

use std::collections::HashMap;
use std::sync::Arc;

use llmflow_core::{ContentBlock, ExecutionError, Message, ProviderError, Role};
use llmflow_db::DbHandle;
use llmflow_db::entity::conversation_messages::Model as MessageModel;
use llmflow_db::entity::conversations::Model as ConversationModel;
use llmflow_service::LlmService;
use serde::de::DeserializeOwned;
use serde_json::Value;
use uuid::Uuid;

use crate::context::ConversationContext;
use crate::store::{ConversationStore, ConversationStoreError, ConversationWithMessages};
use crate::tools::ToolRegistry;

#[derive(Debug, thiserror::Error)]
pub enum ConversationEngineError {
    #[error(transparent)]
    Store(#[from] ConversationStoreError),
    #[error(transparent)]
    Service(#[from] llmflow_service::ServiceError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

pub struct ConversationEngine {
    db: DbHandle,
    service: Arc<LlmService>,
}

fn row_to_message(row: &MessageModel) -> Message {
    let role = match row.role.as_str() {
        "system" => Role::System,
        "assistant" => Role::Assistant,
        "tool" => Role::Tool,
        "function" => Role::Function,
        _ => Role::User,
    };
    let text = match &row.content {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    Message { role, content: vec![ContentBlock::text(text)] }
}

impl ConversationEngine {
    pub fn new(db: DbHandle, service: Arc<LlmService>) -> Self {
        ConversationEngine { db, service }
    }

    pub fn service(&self) -> Arc<LlmService> {
        self.service.clone()
    }

    pub async fn create_conversation(
        &self,
        conversation_type: &str,
        user_id: Option<Uuid>,
        title: Option<String>,
        metadata: Option<Value>,
    ) -> Result<ConversationModel, ConversationEngineError> {
        Ok(ConversationStore::create_conversation(self.db.connection(), conversation_type, user_id, title, metadata).await?)
    }

    /// Binds a `ConversationContext` to an existing conversation, checking
    /// that its stored `conversation_type` matches `expected_type`
    /// (`spec.md` §4.F "type check").
    pub async fn bind(&self, conversation_id: Uuid, expected_type: &str, user_id: Option<Uuid>) -> Result<ConversationContext, ConversationEngineError> {
        let summary = ConversationStore::get_conversation_summary(self.db.connection(), conversation_id)
            .await?
            .ok_or(ConversationStoreError::NotFound(conversation_id))?;

        if summary.conversation_type != expected_type {
            return Err(ConversationEngineError::Execution(ExecutionError::Provider(ProviderError::ValidationError(format!(
                "conversation {conversation_id} has type `{}`, expected `{expected_type}`",
                summary.conversation_type
            )))));
        }

        Ok(ConversationContext::new(self.service.clone(), conversation_id, user_id, summary.metadata))
    }

    pub async fn record_user_message(&self, conversation_id: Uuid, content: impl Into<String>, metadata: Option<Value>) -> Result<MessageModel, ConversationEngineError> {
        Ok(ConversationStore::append_message(&self.db, conversation_id, "user", Value::String(content.into()), None, None, None, metadata.unwrap_or(Value::Null)).await?)
    }

    pub async fn record_system_message(&self, conversation_id: Uuid, content: impl Into<String>, metadata: Option<Value>) -> Result<MessageModel, ConversationEngineError> {
        Ok(ConversationStore::append_message(&self.db, conversation_id, "system", Value::String(content.into()), None, None, None, metadata.unwrap_or(Value::Null)).await?)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn record_assistant_message(
        &self,
        conversation_id: Uuid,
        content: impl Into<String>,
        llm_request_id: Option<Uuid>,
        tokens_used: Option<i32>,
        cost_estimate: Option<f64>,
        metadata: Option<Value>,
    ) -> Result<MessageModel, ConversationEngineError> {
        Ok(ConversationStore::append_message(
            &self.db,
            conversation_id,
            "assistant",
            Value::String(content.into()),
            llm_request_id,
            tokens_used,
            cost_estimate,
            metadata.unwrap_or(Value::Null),
        )
        .await?)
    }

    /// Tool-role rows hold the JSON-encoded tool result rather than plain
    /// text, per `spec.md` §4.F's pseudocode.
    async fn record_tool_message(&self, conversation_id: Uuid, tool_call_id: &str, tool_name: &str, result: Value) -> Result<MessageModel, ConversationEngineError> {
        let content = serde_json::json!({ "tool_call_id": tool_call_id, "name": tool_name, "result": result });
        Ok(ConversationStore::append_message(&self.db, conversation_id, "tool", content, None, None, None, Value::Null).await?)
    }

    pub async fn get_conversation_summary(&self, id: Uuid) -> Result<Option<ConversationModel>, ConversationEngineError> {
        Ok(ConversationStore::get_conversation_summary(self.db.connection(), id).await?)
    }

    pub async fn get_conversation(&self, id: Uuid) -> Result<Option<ConversationWithMessages>, ConversationEngineError> {
        Ok(ConversationStore::get_conversation(self.db.connection(), id).await?)
    }

    pub async fn get_message_history(&self, id: Uuid, limit: Option<u64>, include_system: bool) -> Result<Vec<MessageModel>, ConversationEngineError> {
        Ok(ConversationStore::get_message_history(self.db.connection(), id, limit, include_system).await?)
    }

    /// Prepends an optional system message and appends stored history in
    /// role-preserving form (`spec.md` §4.F `build_llm_messages`).
    pub async fn build_llm_messages(&self, id: Uuid, system_prompt: Option<&str>, include_system: bool) -> Result<Vec<Message>, ConversationEngineError> {
        let history = self.get_message_history(id, None, include_system).await?;
        let mut messages = Vec::with_capacity(history.len() + 1);
        if let Some(prompt) = system_prompt {
            messages.push(Message::system(prompt));
        }
        messages.extend(history.iter().map(row_to_message));
        Ok(messages)
    }

    pub async fn update_conversation_metadata(&self, id: Uuid, patch: Value, merge: bool) -> Result<ConversationModel, ConversationEngineError> {
        Ok(ConversationStore::update_metadata(self.db.connection(), id, patch, merge).await?)
    }

    pub async fn update_conversation_title(&self, id: Uuid, title: Option<String>) -> Result<ConversationModel, ConversationEngineError> {
        Ok(ConversationStore::update_title(self.db.connection(), id, title).await?)
    }

    pub async fn update_conversation_status(&self, id: Uuid, status: &str) -> Result<ConversationModel, ConversationEngineError> {
        Ok(ConversationStore::update_status(self.db.connection(), id, status).await?)
    }

    /// `spec.md` §4.F `generate_assistant_response`: builds the transcript
    /// into a request, calls the service, and records the reply.
    pub async fn generate_assistant_response(
        &self,
        conversation_id: Uuid,
        system_prompt: Option<&str>,
        user_id: Option<Uuid>,
        model: Option<&str>,
        temperature: Option<f32>,
        max_output_tokens: Option<u32>,
    ) -> Result<(Message, Uuid, Value), ConversationEngineError> {
        let messages = self.build_llm_messages(conversation_id, system_prompt, false).await?;
        let (response, request_id) = self
            .service
            .generate_response(messages, user_id, model, temperature, max_output_tokens, HashMap::new())
            .await?;

        self.record_assistant_message(
            conversation_id,
            response.text.clone(),
            Some(request_id),
            Some(response.usage.output_tokens as i32),
            None,
            None,
        )
        .await?;

        Ok((Message::assistant(response.text.clone()), request_id, response.raw))
    }

    /// `spec.md` §4.F `generate_with_tools`: a serial tool-calling loop.
    /// A handler failure becomes `{"error": "<message>"}` in the tool
    /// result rather than aborting the conversation -- the model gets a
    /// chance to recover or explain.
    pub async fn generate_with_tools(
        &self,
        conversation_id: Uuid,
        user_id: Option<Uuid>,
        model: Option<&str>,
        registry: &ToolRegistry,
        max_iterations: usize,
    ) -> Result<(Message, Uuid), ConversationEngineError> {
        let mut messages = self.build_llm_messages(conversation_id, None, false).await?;
        let definitions = registry.definitions();

        for _ in 0..max_iterations {
            let (response, request_id) = self
                .service
                .generate_response_with_tools(messages.clone(), user_id, model, None, None, definitions.clone(), Some(llmflow_core::ToolChoice::Auto))
                .await?;

            if response.tool_calls.is_empty() {
                self.record_assistant_message(
                    conversation_id,
                    response.text.clone(),
                    Some(request_id),
                    Some(response.usage.output_tokens as i32),
                    None,
                    None,
                )
                .await?;
                return Ok((Message::assistant(response.text), request_id));
            }

            messages.push(Message {
                role: Role::Assistant,
                content: response.tool_calls.iter().map(|call| ContentBlock::ToolUse { call: call.clone() }).collect(),
            });

            for call in &response.tool_calls {
                let result = match registry.handler(&call.name) {
                    None => serde_json::json!({ "error": format!("tool {} not found", call.name) }),
                    Some(handler) => match handler.execute(call.arguments.clone()).await {
                        Ok(value) => value,
                        Err(err) => serde_json::json!({ "error": err.to_string() }),
                    },
                };

                self.record_tool_message(conversation_id, &call.id, &call.name, result.clone()).await?;
                messages.push(Message::tool_result(call.id.clone(), result.to_string(), false));
            }
        }

        Err(ConversationEngineError::Execution(ExecutionError::ToolLoopExhausted(max_iterations)))
    }

    /// `spec.md` §4.F `generate_structured_reply`: does **not** record an
    /// assistant message -- the caller decides which field, if any, is the
    /// transcript-worthy utterance.
    pub async fn generate_structured_reply<T>(
        &self,
        conversation_id: Uuid,
        user_id: Option<Uuid>,
        model: Option<&str>,
    ) -> Result<(T, Uuid, llmflow_service::StructuredUsage), ConversationEngineError>
    where
        T: DeserializeOwned + schemars::JsonSchema,
    {
        let messages = self.build_llm_messages(conversation_id, None, false).await?;
        Ok(self.service.generate_structured_response::<T>(messages, user_id, model, None, None).await?)
    }
}
