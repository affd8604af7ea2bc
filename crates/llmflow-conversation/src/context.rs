//! The explicit per-conversation context (`spec.md` §4.F/§4.H). Same
//! redesign as `llmflow_flow::context::ExecutionContext`: an explicit
//! struct passed by reference rather than task-local state, grounded on
//! the teacher's `agent::execution_context::ExecutionContext`.

use std::sync::Mutex;
use std::sync::Arc;

use llmflow_service::LlmService;
use serde_json::Value;
use uuid::Uuid;

/// Per-conversation state handed to every Conversation Engine call.
/// `metadata` is cached at bind time and refreshed whenever this context's
/// owner updates it, so repeated reads don't round-trip the database.
pub struct ConversationContext {
    service: Arc<LlmService>,
    conversation_id: Uuid,
    user_id: Option<Uuid>,
    metadata: Mutex<Value>,
}

impl ConversationContext {
    pub fn new(service: Arc<LlmService>, conversation_id: Uuid, user_id: Option<Uuid>, metadata: Value) -> Self {
        ConversationContext { service, conversation_id, user_id, metadata: Mutex::new(metadata) }
    }

    pub fn service(&self) -> &LlmService {
        &self.service
    }

    pub fn conversation_id(&self) -> Uuid {
        self.conversation_id
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user_id
    }

    pub fn metadata(&self) -> Value {
        self.metadata.lock().expect("metadata mutex poisoned").clone()
    }

    pub fn set_metadata(&self, metadata: Value) {
        *self.metadata.lock().expect("metadata mutex poisoned") = metadata;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmflow_db::DbHandle;

    #[tokio::test]
    async fn metadata_reads_reflect_the_most_recent_write() {
        let db = DbHandle::connect("sqlite::memory:").await.unwrap();
        llmflow_migration::Migrator::up(db.connection(), None).await.unwrap();
        let registry = llmflow_core::ProviderRegistry::new(vec![]);
        let cache = llmflow_cache::ResponseCache::new(std::env::temp_dir(), false, 24, 10);
        let service = Arc::new(LlmService::new(registry, cache, db, llmflow_service::ServiceConfig::default()));

        let ctx = ConversationContext::new(service, Uuid::new_v4(), None, serde_json::json!({"topic": "rust"}));
        assert_eq!(ctx.metadata()["topic"], Value::String("rust".into()));

        ctx.set_metadata(serde_json::json!({"topic": "ownership"}));
        assert_eq!(ctx.metadata()["topic"], Value::String("ownership".into()));
    }
}
