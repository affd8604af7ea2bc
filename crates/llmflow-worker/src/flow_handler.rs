//! The built-in `"flow"` task handler: looks up the named `FlowDefinition`
//! and drives it through `llmflow_flow::execute` exactly as a foreground
//! caller would (`spec.md` §2 "a worker process pulls, reconstitutes an
//! execution context, and drives E exactly as a foreground call would").
//!
//! Concrete flow bodies are out of scope here (`spec.md` §1 "the content
//! of individual flow business logic" is an external collaborator); this
//! handler only needs a name -> `FlowDefinition` table, supplied by the
//! embedding application.

use std::collections::HashMap;
use std::sync::Arc;

use llmflow_db::DbHandle;
use llmflow_flow::FlowDefinition;
use llmflow_queue::FlowJob;
use llmflow_service::LlmService;
use serde_json::Value;

use crate::handler::TaskHandler;

/// Name -> definition table an embedding application populates at startup,
/// mirroring `spec.md` §4.G's "handlers are registered, not hard-coded"
/// one layer up (flow definitions are registered, not hard-coded either).
#[derive(Clone, Default)]
pub struct FlowRegistry {
    flows: HashMap<String, FlowDefinition>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        FlowRegistry::default()
    }

    pub fn register(&mut self, definition: FlowDefinition) -> &mut Self {
        self.flows.insert(definition.name.clone(), definition);
        self
    }

    pub fn get(&self, flow_name: &str) -> Option<&FlowDefinition> {
        self.flows.get(flow_name)
    }
}

pub struct FlowHandler {
    service: Arc<LlmService>,
    db: DbHandle,
    flows: FlowRegistry,
}

impl FlowHandler {
    pub fn new(service: Arc<LlmService>, db: DbHandle, flows: FlowRegistry) -> Self {
        FlowHandler { service, db, flows }
    }
}

#[async_trait::async_trait]
impl TaskHandler for FlowHandler {
    async fn execute(&self, job: &FlowJob) -> Result<Value, anyhow::Error> {
        let definition = self
            .flows
            .get(&job.flow_name)
            .ok_or_else(|| anyhow::anyhow!("no flow named `{}` is registered with this worker", job.flow_name))?;

        let inputs: HashMap<String, Value> = match &job.inputs {
            Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            Value::Null => HashMap::new(),
            other => anyhow::bail!("flow task inputs must be a JSON object, got {other}"),
        };

        let outcome = llmflow_flow::execute(self.service.clone(), &self.db, definition, inputs, job.user_id).await?;
        Ok(serde_json::to_value(&outcome.outputs)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llmflow_core::{ChatRequest, ChatResponse, FinishReason, ProviderAdapter, ProviderError, ProviderRegistry, Usage};
    use llmflow_flow::{StepDefinition, StepKind};
    use llmflow_migration::{Migrator, MigratorTrait};
    use llmflow_service::ServiceConfig;
    use uuid::Uuid;

    struct FakeAdapter;

    #[async_trait::async_trait]
    impl ProviderAdapter for FakeAdapter {
        fn name(&self) -> &'static str {
            "fake"
        }
        fn model_prefixes(&self) -> &'static [&'static str] {
            &["fake-"]
        }
        async fn generate_response(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            let last = request.messages.last().map(|m| m.text()).unwrap_or_default();
            Ok(ChatResponse { text: format!("echo: {last}"), tool_calls: vec![], finish_reason: FinishReason::Stop, usage: Usage { input_tokens: 4, output_tokens: 2 }, raw: serde_json::json!({}) })
        }
        fn estimate_cost(&self, _model: &str, _usage: &Usage) -> f64 {
            0.0
        }
    }

    #[tokio::test]
    async fn runs_the_registered_flow_and_returns_its_outputs() {
        let db = DbHandle::connect("sqlite::memory:").await.unwrap();
        Migrator::up(db.connection(), None).await.unwrap();

        let registry = ProviderRegistry::new(vec![Arc::new(FakeAdapter)]);
        let cache_dir = std::env::temp_dir().join(format!("llmflow-worker-test-{}", Uuid::new_v4()));
        let cache = llmflow_cache::ResponseCache::new(cache_dir, true, 24, 100);
        let service = Arc::new(LlmService::new(registry, cache, db.clone(), ServiceConfig { default_model: "fake-1".into(), ..ServiceConfig::default() }));

        let mut flows = FlowRegistry::new();
        flows.register(FlowDefinition {
            name: "greet".into(),
            steps: vec![StepDefinition { name: "reply".into(), kind: StepKind::Unstructured { prompt_template: "hi {{ name }}".into(), model: None }, input_schema: None }],
            input_schema: None,
        });

        let handler = FlowHandler::new(service, db, flows);
        let job = FlowJob { task_id: Uuid::new_v4(), flow_name: "greet".into(), flow_run_id: None, inputs: serde_json::json!({"name": "ada"}), user_id: None, task_type: "flow".into() };

        let outputs = handler.execute(&job).await.unwrap();
        assert_eq!(outputs["reply"], Value::String("echo: hi ada".into()));
    }

    #[tokio::test]
    async fn unregistered_flow_name_fails_without_panicking() {
        let db = DbHandle::connect("sqlite::memory:").await.unwrap();
        Migrator::up(db.connection(), None).await.unwrap();
        let registry = ProviderRegistry::new(vec![]);
        let cache = llmflow_cache::ResponseCache::new(std::env::temp_dir(), false, 24, 10);
        let service = Arc::new(LlmService::new(registry, cache, db.clone(), ServiceConfig::default()));

        let handler = FlowHandler::new(service, db, FlowRegistry::new());
        let job = FlowJob { task_id: Uuid::new_v4(), flow_name: "missing".into(), flow_run_id: None, inputs: Value::Null, user_id: None, task_type: "flow".into() };

        assert!(handler.execute(&job).await.is_err());
    }
}
