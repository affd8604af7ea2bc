//! `generate_structured_response` (`spec.md` §4.D): ask the provider for a
//! response that validates against `T`'s JSON Schema, then parse it.

use llmflow_core::{Message, StructuredOutputSpec, Usage};
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::{LlmService, ServiceError};

/// Token accounting for a structured call, returned alongside the parsed
/// value so callers don't have to re-fetch the ledger row just to report
/// cost.
#[derive(Debug, Clone, Copy)]
pub struct StructuredUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl From<Usage> for StructuredUsage {
    fn from(usage: Usage) -> Self {
        StructuredUsage { input_tokens: usage.input_tokens, output_tokens: usage.output_tokens }
    }
}

pub(crate) async fn generate_structured_response<T>(
    service: &LlmService,
    messages: Vec<Message>,
    user_id: Option<Uuid>,
    model: Option<&str>,
    temperature: Option<f32>,
    max_output_tokens: Option<u32>,
) -> Result<(T, Uuid, StructuredUsage), ServiceError>
where
    T: DeserializeOwned + JsonSchema,
{
    let schema = schema_for!(T);
    let schema_value = serde_json::to_value(&schema).map_err(|e| ServiceError::StructuredOutputInvalid(e.to_string()))?;

    let spec = StructuredOutputSpec {
        name: std::any::type_name::<T>().rsplit("::").next().unwrap_or("Response").to_owned(),
        schema: schema_value,
        strict: true,
    };

    let (response, request_id) = service
        .generate_response_with_structured_output(messages, user_id, model, temperature, max_output_tokens, spec)
        .await?;

    let parsed: T = serde_json::from_str(&response.text)
        .map_err(|e| ServiceError::StructuredOutputInvalid(format!("{e}: {}", response.text)))?;

    Ok((parsed, request_id, response.usage.into()))
}
