//! Flow definitions and run lifecycle (`spec.md` §4.E). Grounded on the
//! teacher's session run loop (`agent::execution_context::ExecutionContext`
//! plus its caller in `agent::session`): a flow run owns one `ExecutionContext`
//! for its whole lifetime and steps execute serially against it, each
//! writing its own row before the run's own row is updated.

use std::collections::HashMap;
use std::sync::Arc;

use llmflow_core::ExecutionError;
use llmflow_db::DbHandle;
use llmflow_service::LlmService;
use serde_json::Value;
use tracing::instrument;
use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::step::{execute_step, StepDefinition, StepResult};
use crate::store::FlowStore;
use crate::validation::validate_inputs;

/// A named, ordered sequence of steps. `spec.md` §4.E: a flow is data, not
/// a class -- `BaseFlow::run` below is the one place that interprets it.
#[derive(Debug, Clone)]
pub struct FlowDefinition {
    pub name: String,
    pub steps: Vec<StepDefinition>,
    /// JSON Schema the flow's top-level `inputs` must satisfy before the
    /// run row is even created (`spec.md` §4.E `execute`). `None` means
    /// the flow declared no schema and accepts any input shape.
    pub input_schema: Option<Value>,
}

/// What a completed flow run produced. `outputs` binds every step's name to
/// its result, mirroring the row written to `flow_runs.outputs`.
#[derive(Debug, Clone)]
pub struct FlowOutcome {
    pub run_id: Uuid,
    pub outputs: HashMap<String, Value>,
    pub total_tokens: u32,
    pub total_cost_estimate: f64,
}

/// Runs a flow definition start to finish (`spec.md` §4.E `execute`):
/// creates the run row, executes each step serially feeding prior outputs
/// forward as template bindings, and closes the run row on success or
/// failure. `execution_mode` is written through to `flow_runs.execution_mode`
/// (`"sync"` here; `execute_background` below uses `"background"`, the
/// only two values `spec.md` §3 allows).
#[instrument(name = "llmflow.flow.execute", skip(service, definition, inputs))]
pub async fn execute(
    service: Arc<LlmService>,
    db: &DbHandle,
    definition: &FlowDefinition,
    inputs: HashMap<String, Value>,
    user_id: Option<Uuid>,
) -> Result<FlowOutcome, ExecutionError> {
    run(service, db, definition, inputs, user_id, "sync").await
}

/// Spawns `definition` on a background task and returns immediately with
/// the run id the caller can poll (`spec.md` §4.E `execute_background`,
/// §4.G task queue integration). Errors surfacing after the handle is
/// returned are only observable via the run row's `status`/`error_message`.
pub fn execute_background(
    service: Arc<LlmService>,
    db: DbHandle,
    definition: FlowDefinition,
    inputs: HashMap<String, Value>,
    user_id: Option<Uuid>,
) -> tokio::task::JoinHandle<Result<FlowOutcome, ExecutionError>> {
    tokio::spawn(async move { run(service, &db, &definition, inputs, user_id, "background").await })
}

async fn run(
    service: Arc<LlmService>,
    db: &DbHandle,
    definition: &FlowDefinition,
    inputs: HashMap<String, Value>,
    user_id: Option<Uuid>,
    execution_mode: &str,
) -> Result<FlowOutcome, ExecutionError> {
    let inputs_value = serde_json::to_value(&inputs).unwrap_or(Value::Null);
    validate_inputs(definition.input_schema.as_ref(), &inputs_value)?;

    let total_steps = definition.steps.len() as i32;
    let run_id = FlowStore::create_run(db.connection(), &definition.name, inputs_value, user_id, execution_mode, Some(total_steps))
        .await
        .map_err(|e| ExecutionError::Other(anyhow::anyhow!(e)))?;

    let ctx = ExecutionContext::new(service, run_id, user_id);
    let mut bindings = inputs;
    let mut outputs = HashMap::new();

    for (index, step_def) in definition.steps.iter().enumerate() {
        let result: Result<StepResult, ExecutionError> = execute_step(db.connection(), &ctx, run_id, step_def, &bindings).await;
        match result {
            Ok(step_result) => {
                bindings.insert(step_def.name.clone(), step_result.output.clone());
                outputs.insert(step_def.name.clone(), step_result.output.clone());

                FlowStore::update_progress(
                    db.connection(),
                    run_id,
                    &step_def.name,
                    index as i32 + 1,
                    step_result.tokens_used.unwrap_or(0) as i32,
                    step_result.cost_estimate.unwrap_or(0.0),
                )
                .await
                .map_err(|e| ExecutionError::Other(anyhow::anyhow!(e)))?;
            }
            Err(err) => {
                FlowStore::fail_run(db.connection(), run_id, &err.to_string())
                    .await
                    .map_err(|e| ExecutionError::Other(anyhow::anyhow!(e)))?;
                return Err(err);
            }
        }
    }

    FlowStore::complete_run(db.connection(), run_id, serde_json::to_value(&outputs).unwrap_or(Value::Null))
        .await
        .map_err(|e| ExecutionError::Other(anyhow::anyhow!(e)))?;

    Ok(FlowOutcome { run_id, outputs, total_tokens: ctx.total_tokens(), total_cost_estimate: ctx.total_cost_estimate() })
}
