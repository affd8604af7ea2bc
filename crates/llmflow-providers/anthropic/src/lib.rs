//! Anthropic Messages API adapter.
//!
//! Wire shape grounded on the teacher's `providers/anthropic` crate:
//! `system` is a top-level request field rather than a message in the
//! array, tool use/result are content blocks tagged by `type`, and auth
//! goes through the `x-api-key`/`anthropic-version` headers instead of a
//! bearer token.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use llmflow_core::{
    ChatRequest, ChatResponse, ContentBlock, FinishReason, ImageMime, Message, ProviderAdapter,
    ProviderError, Role, ToolCall, ToolChoice, Usage,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

const ANTHROPIC_VERSION: &str = "2023-06-01";

const RATES: &[(&str, f64, f64)] = &[
    ("claude-3-5-haiku", 0.80, 4.00),
    ("claude-3-haiku", 0.25, 1.25),
    ("claude-3-5-sonnet", 3.00, 15.00),
    ("claude-3-7-sonnet", 3.00, 15.00),
    ("claude-sonnet-4", 3.00, 15.00),
    ("claude-opus-4", 15.00, 75.00),
    ("claude-3-opus", 15.00, 75.00),
];
const DEFAULT_RATE: (f64, f64) = (3.00, 15.00);

pub struct AnthropicConfig {
    pub api_key: String,
    pub base_url: Url,
}

impl AnthropicConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        AnthropicConfig { api_key: api_key.into(), base_url: Url::parse("https://api.anthropic.com/v1/").unwrap() }
    }
}

pub struct AnthropicAdapter {
    config: AnthropicConfig,
    client: reqwest::Client,
}

impl AnthropicAdapter {
    pub fn new(config: AnthropicConfig) -> Self {
        AnthropicAdapter { config, client: reqwest::Client::new() }
    }
}

#[derive(Serialize)]
struct WireBlock {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    source: Option<ImageSource>,
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
    #[serde(skip_serializing_if = "Option::is_none")]
    is_error: Option<bool>,
}

#[derive(Serialize)]
struct ImageSource {
    #[serde(rename = "type")]
    kind: &'static str,
    media_type: &'static str,
    data: String,
}

#[derive(Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<WireBlock>,
}

#[derive(Serialize)]
struct WireTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a Value,
}

#[derive(Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
}

#[derive(Deserialize)]
struct MessagesResponse {
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
        ContentBlock::Text { text } => WireBlock {
            kind: "text",
            text: Some(text.clone()),
            source: None,
            id: None,
            name: None,
            input: None,
            tool_use_id: None,
            content: None,
            is_error: None,
        },
        ContentBlock::Image { mime, data } => WireBlock {
            kind: "image",
            text: None,
            source: Some(ImageSource { kind: "base64", media_type: mime_str(mime), data: BASE64.encode(data) }),
            id: None,
            name: None,
            input: None,
            tool_use_id: None,
            content: None,
            is_error: None,
        },
        ContentBlock::ImageUrl { url } => WireBlock {
            kind: "text",
            text: Some(format!("[image: {url}]")),
            source: None,
            id: None,
            name: None,
            input: None,
            tool_use_id: None,
            content: None,
            is_error: None,
        },
        ContentBlock::ToolUse { call } => WireBlock {
            kind: "tool_use",
            text: None,
            source: None,
            id: Some(call.id.clone()),
            name: Some(call.name.clone()),
            input: Some(call.arguments.clone()),
            tool_use_id: None,
            content: None,
            is_error: None,
        },
        ContentBlock::ToolResult { tool_call_id, content, is_error } => WireBlock {
            kind: "tool_result",
            text: None,
            source: None,
            id: None,
            name: None,
            input: None,
            tool_use_id: Some(tool_call_id.clone()),
            content: Some(content.clone()),
            is_error: Some(*is_error),
        },
    }
}

fn mime_str(mime: &ImageMime) -> &'static str {
    match mime {
        ImageMime::Jpeg => "image/jpeg",
        ImageMime::Png => "image/png",
        ImageMime::Gif => "image/gif",
        ImageMime::Webp => "image/webp",
    }
}

/// Anthropic has no top-level `tool`/`system` message role: system prompts
/// are lifted into the request's `system` field, and tool results travel
/// inside a `user` turn as `tool_result` blocks.
fn split_system_and_turns(messages: &[Message]) -> (Option<String>, Vec<WireMessage>) {
    let mut system_parts = Vec::new();
    let mut turns = Vec::new();

    for message in messages {
        match message.role {
            Role::System => system_parts.push(message.text()),
            Role::User | Role::Tool | Role::Function => {
                turns.push(WireMessage { role: "user", content: message.content.iter().map(block_to_wire).collect() })
            }
            Role::Assistant => {
                turns.push(WireMessage { role: "assistant", content: message.content.iter().map(block_to_wire).collect() })
            }
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
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn model_prefixes(&self) -> &'static [&'static str] {
        &["claude-"]
    }

    async fn generate_response(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let (system, messages) = split_system_and_turns(&request.messages);

        let tools: Vec<WireTool> = request
            .tools
            .iter()
            .map(|t| WireTool { name: &t.name, description: &t.description, input_schema: &t.parameters })
            .collect();

        let tool_choice = request.tool_choice.as_ref().map(|choice| match choice {
            ToolChoice::Auto => json!({"type": "auto"}),
            ToolChoice::Any => json!({"type": "any"}),
            ToolChoice::None => json!({"type": "none"}),
            ToolChoice::Tool(name) => json!({"type": "tool", "name": name}),
        });

        let body = MessagesRequest {
            model: &request.model,
            messages,
            max_tokens: request.max_tokens.unwrap_or(4096),
            system: system.as_deref(),
            temperature: request.temperature,
            tools,
            tool_choice,
        };

        let url = self.config.base_url.join("messages")?;
        let response = self
            .client
            .post(url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let raw_text = response.text().await?;

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProviderError::AuthenticationError(raw_text));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimitError { message: raw_text, retry_after: None });
        }
        if !status.is_success() {
            return Err(ProviderError::ProviderError { message: format!("HTTP {status}"), raw_response: Some(raw_text), retryable: status.is_server_error() });
        }

        let raw: Value = serde_json::from_str(&raw_text)?;
        let parsed: MessagesResponse = serde_json::from_value(raw.clone())?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for block in parsed.content {
            match block {
                ResponseBlock::Text { text: t } => text.push_str(&t),
                ResponseBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall { id, name, arguments: input }),
                ResponseBlock::Other => {}
            }
        }

        Ok(ChatResponse {
            text,
            tool_calls,
            finish_reason: finish_reason_from(parsed.stop_reason.as_deref()),
            usage: parsed.usage,
            raw,
        })
    }

    fn estimate_cost(&self, model: &str, usage: &Usage) -> f64 {
        let (input_rate, output_rate) = RATES
            .iter()
            .filter(|(prefix, _, _)| model.starts_with(prefix))
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
    fn system_messages_are_lifted_out_of_the_turn_array() {
        let messages = vec![Message::system("be terse"), Message::user("hi")];
        let (system, turns) = split_system_and_turns(&messages);
        assert_eq!(system.as_deref(), Some("be terse"));
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, "user");
    }

    #[test]
    fn tool_result_message_becomes_a_user_turn() {
        let messages = vec![Message::tool_result("call_1", "42", false)];
        let (_, turns) = split_system_and_turns(&messages);
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, "user");
    }

    #[test]
    fn estimate_cost_prefers_longest_model_prefix() {
        let adapter = AnthropicAdapter::new(AnthropicConfig::new("k"));
        let usage = Usage { input_tokens: 1_000_000, output_tokens: 1_000_000 };
        assert_eq!(adapter.estimate_cost("claude-3-5-haiku-20241022", &usage), 0.80 + 4.00);
    }
}
