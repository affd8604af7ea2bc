//! The Flow Execution Engine (`SPEC_FULL.md` §4.E): ordered, named
//! sequences of LLM-powered steps, each one of four kinds (`StepKind`),
//! run serially against one `ExecutionContext` and persisted step-by-step
//! to `flow_runs`/`flow_step_runs`.

pub mod context;
pub mod flow;
pub mod step;
pub mod store;
pub mod template;
pub mod validation;

pub use context::ExecutionContext;
pub use flow::{execute, execute_background, FlowDefinition, FlowOutcome};
pub use step::{execute_step, StepDefinition, StepKind, StepResult};
pub use store::{FlowStore, FlowStoreError};
pub use validation::validate_inputs;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use llmflow_core::{ChatRequest, ChatResponse, FinishReason, ProviderAdapter, ProviderError, ProviderRegistry, Usage};
    use llmflow_db::DbHandle;
    use llmflow_migration::{Migrator, MigratorTrait};
    use llmflow_service::{LlmService, ServiceConfig};
    use serde::Deserialize;
    use serde_json::Value;

    /// Echoes the last user message back, optionally wrapped as the JSON
    /// object `{"headline": "<text>"}` when the request carries a
    /// structured-output spec, so the structured step kind has something
    /// parseable to validate against.
    struct FakeAdapter {
        calls: AtomicU32,
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
            self.calls.fetch_add(1, Ordering::SeqCst);
            let last = request.messages.last().map(|m| m.text()).unwrap_or_default();
            let text = if request.structured_output.is_some() {
                serde_json::json!({ "headline": last }).to_string()
            } else {
                format!("summary of: {last}")
            };
            Ok(ChatResponse {
                text,
                tool_calls: vec![],
                finish_reason: FinishReason::Stop,
                usage: Usage { input_tokens: 20, output_tokens: 8 },
                raw: serde_json::json!({}),
            })
        }
        fn estimate_cost(&self, _model: &str, usage: &Usage) -> f64 {
            usage.total() as f64 * 0.00002
        }
    }

    #[derive(Debug, Deserialize, schemars::JsonSchema)]
    struct Headline {
        headline: String,
    }

    async fn service() -> (Arc<LlmService>, DbHandle) {
        let db = DbHandle::connect("sqlite::memory:").await.unwrap();
        Migrator::up(db.connection(), None).await.unwrap();
        let registry = ProviderRegistry::new(vec![Arc::new(FakeAdapter { calls: AtomicU32::new(0) })]);
        let cache_dir = std::env::temp_dir().join(format!("llmflow-flow-test-{}", uuid::Uuid::new_v4()));
        let cache = llmflow_cache::ResponseCache::new(cache_dir, true, 24, 100);
        let llm_service = LlmService::new(registry, cache, db.clone(), ServiceConfig { default_model: "fake-1".into(), ..ServiceConfig::default() });
        (Arc::new(llm_service), db)
    }

    /// Approximates scenario S2 from `spec.md` §8: a flow with one
    /// unstructured step feeding a second, structured step whose prompt
    /// references the first step's output by name.
    #[tokio::test]
    async fn flow_with_a_structured_second_step_runs_both_steps_in_order() {
        let (svc, db) = service().await;

        let schema = schemars::schema_for!(Headline);
        let definition = FlowDefinition {
            name: "summarize_and_headline".into(),
            steps: vec![
                StepDefinition {
                    name: "summary".into(),
                    kind: StepKind::Unstructured { prompt_template: "Summarize: {{ topic }}".into(), model: None },
                    input_schema: None,
                },
                StepDefinition {
                    name: "headline".into(),
                    kind: StepKind::Structured {
                        prompt_template: "Headline for: {{ summary }}".into(),
                        schema: serde_json::to_value(&schema).unwrap(),
                        schema_name: "Headline".into(),
                        model: None,
                    },
                    input_schema: None,
                },
            ],
            input_schema: None,
        };

        let mut inputs = HashMap::new();
        inputs.insert("topic".to_owned(), Value::String("rust ownership".into()));

        let outcome = execute(svc, &db, &definition, inputs, None).await.unwrap();

        assert_eq!(outcome.outputs.len(), 2);
        let summary = outcome.outputs.get("summary").unwrap().as_str().unwrap();
        assert!(summary.contains("rust ownership"));

        let headline = outcome.outputs.get("headline").unwrap();
        assert_eq!(headline["headline"], Value::String(summary.to_owned()));
        assert!(outcome.total_tokens > 0);

        let run = FlowStore::get_run(db.connection(), outcome.run_id).await.unwrap().unwrap();
        assert_eq!(run.status, "completed");
        assert_eq!(run.step_progress, 2);
        assert_eq!(run.percentage, 100);

        let steps = FlowStore::steps_for_run(db.connection(), outcome.run_id).await.unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].step_order, 1);
        assert_eq!(steps[1].step_order, 2);
        assert_eq!(steps[0].status, "completed");
        assert_eq!(steps[1].status, "completed");
    }

    /// `spec.md` §4.E: `execute` validates inputs against the flow's
    /// declared schema before the run row is even created.
    #[tokio::test]
    async fn inputs_failing_the_flows_declared_schema_are_rejected_before_the_run_is_created() {
        let (svc, db) = service().await;

        let definition = FlowDefinition {
            name: "needs_topic".into(),
            steps: vec![StepDefinition {
                name: "only_step".into(),
                kind: StepKind::Unstructured { prompt_template: "Summarize: {{ topic }}".into(), model: None },
                input_schema: None,
            }],
            input_schema: Some(serde_json::json!({
                "type": "object",
                "required": ["topic"],
                "properties": { "topic": { "type": "string" } }
            })),
        };

        let err = execute(svc, &db, &definition, HashMap::new(), None).await.unwrap_err();
        assert!(matches!(err, llmflow_core::ExecutionError::ValidationError(_)));
    }

    /// An unbound template variable fails the whole run and is recorded on
    /// the run row rather than panicking or silently skipping the step.
    #[tokio::test]
    async fn unbound_template_variable_fails_the_run_and_records_the_error() {
        let (svc, db) = service().await;

        let definition = FlowDefinition {
            name: "broken".into(),
            steps: vec![StepDefinition {
                name: "only_step".into(),
                kind: StepKind::Unstructured { prompt_template: "{{ missing_var }}".into(), model: None },
                input_schema: None,
            }],
            input_schema: None,
        };

        let err = execute(svc, &db, &definition, HashMap::new(), None).await.unwrap_err();
        assert!(matches!(err, llmflow_core::ExecutionError::UnboundTemplateVariable(name) if name == "missing_var"));
    }

    #[tokio::test]
    async fn execute_background_completes_the_run_without_blocking_the_caller() {
        let (svc, db) = service().await;

        let definition = FlowDefinition {
            name: "async_flow".into(),
            steps: vec![StepDefinition {
                name: "only_step".into(),
                kind: StepKind::Unstructured { prompt_template: "hello {{ name }}".into(), model: None },
                input_schema: None,
            }],
            input_schema: None,
        };
        let mut inputs = HashMap::new();
        inputs.insert("name".to_owned(), Value::String("world".into()));

        let handle = execute_background(svc, db.clone(), definition, inputs, None);
        let outcome = handle.await.unwrap().unwrap();

        let run = FlowStore::get_run(db.connection(), outcome.run_id).await.unwrap().unwrap();
        assert_eq!(run.execution_mode, "background");
        assert_eq!(run.status, "completed");
    }
}
