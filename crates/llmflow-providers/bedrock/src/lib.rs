//! AWS Bedrock adapter (Anthropic Claude models via `InvokeModel`).
//!
//! No teacher adapter covers Bedrock directly (the teacher's `mrs` crate
//! wraps local `mistral.rs` inference, not AWS). Bedrock's `InvokeModel`
//! API for Claude models accepts the same Anthropic Messages request body
//! the teacher's `providers/anthropic` crate builds (`anthropic_version`
//! inside the body instead of a header, no top-level `model` field since
//! it's in the URL path) -- this adapter is modeled on that request shape
//! with a pluggable `Signer` standing in for SigV4 request signing, which
//! is an orthogonal concern to message translation.

use async_trait::async_trait;
use llmflow_core::{
    ChatRequest, ChatResponse, ContentBlock, FinishReason, Message, ProviderAdapter, ProviderError,
    Role, ToolCall, Usage,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

const ANTHROPIC_VERSION_ON_BEDROCK: &str = "bedrock-2023-05-31";

const RATES: &[(&str, f64, f64)] = &[
    ("anthropic.claude-3-5-haiku", 0.80, 4.00),
    ("anthropic.claude-3-haiku", 0.25, 1.25),
    ("anthropic.claude-3-5-sonnet", 3.00, 15.00),
    ("anthropic.claude-3-opus", 15.00, 75.00),
];
const DEFAULT_RATE: (f64, f64) = (3.00, 15.00);

/// Signs an outgoing Bedrock `InvokeModel` request. Kept as a trait so the
/// adapter itself has no AWS-credential-provider dependency; a real
/// deployment supplies a SigV4 implementation, tests supply a no-op one.
pub trait Signer: Send + Sync {
    fn sign(&self, request: reqwest::RequestBuilder, body: &[u8]) -> reqwest::RequestBuilder;
}

pub struct NoopSigner;

impl Signer for NoopSigner {
    fn sign(&self, request: reqwest::RequestBuilder, _body: &[u8]) -> reqwest::RequestBuilder {
        request
    }
}

pub struct BedrockConfig {
    pub region: String,
    pub base_url: Url,
}

impl BedrockConfig {
    pub fn new(region: impl Into<String>) -> Self {
        let region = region.into();
        let base_url = Url::parse(&format!("https://bedrock-runtime.{region}.amazonaws.com/")).unwrap();
        BedrockConfig { region, base_url }
    }
}

pub struct BedrockAdapter {
    config: BedrockConfig,
    signer: Box<dyn Signer>,
    client: reqwest::Client,
}

impl BedrockAdapter {
    pub fn new(config: BedrockConfig, signer: Box<dyn Signer>) -> Self {
        BedrockAdapter { config, signer, client: reqwest::Client::new() }
    }
}

#[derive(Serialize)]
struct WireBlock {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_use_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<WireBlock>,
}

#[derive(Serialize)]
struct InvokeModelBody<'a> {
    anthropic_version: &'static str,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct InvokeModelResponse {
    content: Vec<ResponseBlock>,
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: Value },
    #[serde(other)]
    Other,
}

fn block_to_wire(block: &ContentBlock) -> WireBlock {
    match block {
        ContentBlock::Text { text } => WireBlock { kind: "text", text: Some(text.clone()), id: None, name: None, input: None, tool_use_id: None, content: None },
        ContentBlock::ToolUse { call } => WireBlock {
            kind: "tool_use",
            text: None,
            id: Some(call.id.clone()),
            name: Some(call.name.clone()),
            input: Some(call.arguments.clone()),
            tool_use_id: None,
            content: None,
        },
        ContentBlock::ToolResult { tool_call_id, content, .. } => {
            WireBlock { kind: "tool_result", text: None, id: None, name: None, input: None, tool_use_id: Some(tool_call_id.clone()), content: Some(content.clone()) }
        }
        ContentBlock::Image { .. } | ContentBlock::ImageUrl { .. } => {
            WireBlock { kind: "text", text: Some("[image omitted: Bedrock adapter does not inline images]".into()), id: None, name: None, input: None, tool_use_id: None, content: None }
        }
    }
}

fn split_system_and_turns(messages: &[Message]) -> (Option<String>, Vec<WireMessage>) {
    let mut system_parts = Vec::new();
    let mut turns = Vec::new();

    for message in messages {
        match message.role {
            Role::System => system_parts.push(message.text()),
            Role::User | Role::Tool | Role::Function => turns.push(WireMessage { role: "user", content: message.content.iter().map(block_to_wire).collect() }),
            Role::Assistant => turns.push(WireMessage { role: "assistant", content: message.content.iter().map(block_to_wire).collect() }),
        }
    }

    let system = if system_parts.is_empty() { None } else { Some(system_parts.join("\n\n")) };
    (system, turns)
}

fn finish_reason_from(raw: Option<&str>) -> FinishReason {
    match raw {
        Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        _ => FinishReason::Other,
    }
}

#[async_trait]
impl ProviderAdapter for BedrockAdapter {
    fn name(&self) -> &'static str {
        "bedrock"
    }

    fn model_prefixes(&self) -> &'static [&'static str] {
        &["bedrock/"]
    }

    async fn generate_response(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let model_id = request.model.trim_start_matches("bedrock/");
        let (system, messages) = split_system_and_turns(&request.messages);

        let body = InvokeModelBody {
            anthropic_version: ANTHROPIC_VERSION_ON_BEDROCK,
            messages,
            max_tokens: request.max_tokens.unwrap_or(4096),
            system: system.as_deref(),
            temperature: request.temperature,
        };
        let body_bytes = serde_json::to_vec(&body)?;

        let path = format!("model/{model_id}/invoke");
        let url = self.config.base_url.join(&path)?;

        let builder = self.client.post(url).header(reqwest::header::CONTENT_TYPE, "application/json").body(body_bytes.clone());
        let response = self.signer.sign(builder, &body_bytes).send().await?;

        let status = response.status();
        let raw_text = response.text().await?;

        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(ProviderError::AuthenticationError(raw_text));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimitError { message: raw_text, retry_after: None });
        }
        if !status.is_success() {
            return Err(ProviderError::ProviderError { message: format!("HTTP {status}"), raw_response: Some(raw_text), retryable: status.is_server_error() });
        }

        let raw: Value = serde_json::from_str(&raw_text)?;
        let parsed: InvokeModelResponse = serde_json::from_value(raw.clone())?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in parsed.content {
            match block {
                ResponseBlock::Text { text: t } => text.push_str(&t),
                ResponseBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall { id, name, arguments: input }),
                ResponseBlock::Other => {}
            }
        }

        Ok(ChatResponse { text, tool_calls, finish_reason: finish_reason_from(parsed.stop_reason.as_deref()), usage: parsed.usage, raw })
    }

    fn estimate_cost(&self, model: &str, usage: &Usage) -> f64 {
        let bare = model.trim_start_matches("bedrock/");
        let (input_rate, output_rate) = RATES
            .iter()
            .filter(|(prefix, _, _)| bare.starts_with(prefix))
            .max_by_key(|(prefix, _, _)| prefix.len())
            .map(|(_, i, o)| (*i, *o))
            .unwrap_or(DEFAULT_RATE);

        (usage.input_tokens as f64 / 1_000_000.0) * input_rate + (usage.output_tokens as f64 / 1_000_000.0) * output_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_bedrock_prefix_for_cost_lookup() {
        let adapter = BedrockAdapter::new(BedrockConfig::new("us-east-1"), Box::new(NoopSigner));
        let usage = Usage { input_tokens: 1_000_000, output_tokens: 1_000_000 };
        assert_eq!(adapter.estimate_cost("bedrock/anthropic.claude-3-haiku-v1", &usage), 0.25 + 1.25);
    }

    #[test]
    fn region_is_embedded_in_the_default_base_url() {
        let config = BedrockConfig::new("eu-west-1");
        assert!(config.base_url.as_str().contains("eu-west-1"));
    }
}
