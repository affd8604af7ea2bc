//! `StepKind` and single-step execution (`spec.md` §4.E, REDESIGN FLAGS).
//!
//! The original program modeled steps as a class hierarchy (one subclass per
//! kind, overriding a `run` method). `spec.md` §9 flags that as unnecessary
//! indirection for four fixed kinds and asks for a tagged enum instead --
//! matching how the teacher represents closed, small variant sets (see
//! `llmflow_core::message::ContentBlock`).

use std::collections::HashMap;
use std::time::Instant;

use llmflow_core::ExecutionError;
use serde_json::Value;
use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::store::FlowStore;
use crate::template;
use crate::validation::validate_inputs;

/// The four kinds of work a step can perform. Each variant carries exactly
/// the fields that kind's call needs; there is no shared base type to
/// subclass because there is no behavior that varies independently of the
/// kind (`spec.md` §9).
#[derive(Debug, Clone)]
pub enum StepKind {
    Unstructured {
        prompt_template: String,
        model: Option<String>,
    },
    Structured {
        prompt_template: String,
        schema: Value,
        schema_name: String,
        model: Option<String>,
    },
    Image {
        prompt_template: String,
        size: Option<String>,
        quality: Option<String>,
        style: Option<String>,
        model: Option<String>,
    },
    Audio {
        text_template: String,
        voice: String,
        format: Option<String>,
        speed: Option<f32>,
        model: Option<String>,
    },
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Unstructured { .. } => "unstructured",
            StepKind::Structured { .. } => "structured",
            StepKind::Image { .. } => "image",
            StepKind::Audio { .. } => "audio",
        }
    }
}

/// A named, ordered unit of work inside a flow definition.
#[derive(Debug, Clone)]
pub struct StepDefinition {
    pub name: String,
    pub kind: StepKind,
    /// JSON Schema the bindings available to this step (prior steps'
    /// outputs plus the flow's own inputs) must satisfy before it runs
    /// (`spec.md` §4.E). `None` means the step declared no schema.
    pub input_schema: Option<Value>,
}

/// What a completed step produced, handed to the next step's template as
/// part of its available bindings (`spec.md` §4.E: step outputs become
/// template inputs for later steps, addressed by step name).
#[derive(Debug, Clone)]
pub struct StepResult {
    pub step_run_id: Uuid,
    pub output: Value,
    pub tokens_used: Option<u32>,
    pub cost_estimate: Option<f64>,
}

/// Executes one step: renders its template(s) against `bindings`, dispatches
/// to the service call matching its kind, and records the step row's full
/// lifecycle (`pending` -> `running` via timestamps -> `completed`/`failed`).
pub async fn execute_step<C: sea_orm::ConnectionTrait>(
    db: &C,
    ctx: &ExecutionContext,
    flow_run_id: Uuid,
    def: &StepDefinition,
    bindings: &HashMap<String, Value>,
) -> Result<StepResult, ExecutionError> {
    let step_order = ctx.next_step_order();

    let bindings_value = serde_json::to_value(bindings).unwrap_or(Value::Null);
    validate_inputs(def.input_schema.as_ref(), &bindings_value)?;

    let rendered_inputs = render_inputs(&def.kind, bindings)?;
    let step_id = FlowStore::create_step(db, flow_run_id, &def.name, step_order, def.kind.as_str(), rendered_inputs.clone())
        .await
        .map_err(|e| ExecutionError::Other(anyhow::anyhow!(e)))?;

    let started = Instant::now();
    let outcome = run_kind(ctx, &def.kind, bindings).await;
    let elapsed_ms = started.elapsed().as_millis() as i64;

    match outcome {
        Ok((output, llm_request_id, tokens_used, cost_estimate)) => {
            FlowStore::complete_step(db, step_id, output.clone(), llm_request_id, tokens_used.map(|t| t as i32), cost_estimate, elapsed_ms)
                .await
                .map_err(|e| ExecutionError::Other(anyhow::anyhow!(e)))?;
            if let (Some(tokens), Some(cost)) = (tokens_used, cost_estimate) {
                ctx.record_usage(tokens, cost);
            }
            Ok(StepResult { step_run_id: step_id, output, tokens_used, cost_estimate })
        }
        Err(err) => {
            FlowStore::fail_step(db, step_id, &err.to_string(), elapsed_ms)
                .await
                .map_err(|e| ExecutionError::Other(anyhow::anyhow!(e)))?;
            Err(err)
        }
    }
}

fn render_inputs(kind: &StepKind, bindings: &HashMap<String, Value>) -> Result<Value, ExecutionError> {
    let rendered = match kind {
        StepKind::Unstructured { prompt_template, .. } => template::render(prompt_template, bindings)?,
        StepKind::Structured { prompt_template, .. } => template::render(prompt_template, bindings)?,
        StepKind::Image { prompt_template, .. } => template::render(prompt_template, bindings)?,
        StepKind::Audio { text_template, .. } => template::render(text_template, bindings)?,
    };
    Ok(Value::String(rendered))
}

/// The ledger already computed a real cost from the response's actual
/// token usage when it recorded `request_id` (`llmflow_service::
/// LlmService::generate_response`); read it back rather than re-estimating
/// from the rendered prompt, which carries no usage information at all.
async fn step_cost(ctx: &ExecutionContext, request_id: Uuid) -> Option<f64> {
    ctx.service().get_request(request_id).await.ok().flatten().and_then(|row| row.cost_estimate)
}

async fn run_kind(
    ctx: &ExecutionContext,
    kind: &StepKind,
    bindings: &HashMap<String, Value>,
) -> Result<(Value, Option<Uuid>, Option<u32>, Option<f64>), ExecutionError> {
    match kind {
        StepKind::Unstructured { prompt_template, model } => {
            let prompt = template::render(prompt_template, bindings)?;
            let (response, request_id) = ctx
                .service()
                .generate_response(vec![llmflow_core::Message::user(prompt)], ctx.user_id(), model.as_deref(), None, None, HashMap::new())
                .await
                .map_err(|e| ExecutionError::Other(anyhow::anyhow!(e)))?;
            let cost = step_cost(ctx, request_id).await;
            Ok((Value::String(response.text), Some(request_id), Some(response.usage.total()), cost))
        }
        StepKind::Structured { prompt_template, schema, schema_name, model } => {
            let prompt = template::render(prompt_template, bindings)?;
            let spec = llmflow_core::StructuredOutputSpec { name: schema_name.clone(), schema: schema.clone(), strict: true };
            let (response, request_id) = ctx
                .service()
                .generate_response_with_structured_output(vec![llmflow_core::Message::user(prompt)], ctx.user_id(), model.as_deref(), None, None, spec)
                .await
                .map_err(|e| ExecutionError::Other(anyhow::anyhow!(e)))?;
            let parsed: Value = serde_json::from_str(&response.text).map_err(|e| ExecutionError::Other(anyhow::anyhow!("structured output did not parse as JSON: {e}")))?;
            let cost = step_cost(ctx, request_id).await;
            Ok((parsed, Some(request_id), Some(response.usage.total()), cost))
        }
        StepKind::Image { prompt_template, size, quality, style, model } => {
            let prompt = template::render(prompt_template, bindings)?;
            let (response, request_id) = ctx
                .service()
                .generate_image(&prompt, ctx.user_id(), size.clone(), quality.clone(), style.clone(), model.as_deref())
                .await
                .map_err(|e| ExecutionError::Other(anyhow::anyhow!(e)))?;
            Ok((serde_json::json!({ "images": response.images }), Some(request_id), None, None))
        }
        StepKind::Audio { text_template, voice, format, speed, model } => {
            let text = template::render(text_template, bindings)?;
            let (response, request_id) = ctx
                .service()
                .generate_audio(&text, voice, ctx.user_id(), model.as_deref(), format.clone(), *speed)
                .await
                .map_err(|e| ExecutionError::Other(anyhow::anyhow!(e)))?;
            Ok((serde_json::json!({ "mime_type": response.mime_type, "bytes": response.audio.len() }), Some(request_id), None, None))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_kind_as_str_matches_the_ledger_vocabulary() {
        assert_eq!(StepKind::Unstructured { prompt_template: String::new(), model: None }.as_str(), "unstructured");
        assert_eq!(
            StepKind::Structured { prompt_template: String::new(), schema: Value::Null, schema_name: String::new(), model: None }.as_str(),
            "structured"
        );
        assert_eq!(StepKind::Image { prompt_template: String::new(), size: None, quality: None, style: None, model: None }.as_str(), "image");
        assert_eq!(StepKind::Audio { text_template: String::new(), voice: String::new(), format: None, speed: None, model: None }.as_str(), "audio");
    }
}
