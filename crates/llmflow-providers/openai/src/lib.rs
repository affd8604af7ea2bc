//! OpenAI Chat Completions adapter.
//!
//! Wire shape grounded on the teacher's `providers/openai` crate: a flat
//! `messages` array with `role`/`content`/`tool_calls`/`tool_call_id`
//! fields, `Authorization: Bearer` auth, and a JSON response whose
//! `choices[0].message` holds the reply.

use async_trait::async_trait;
use llmflow_core::{
    ChatRequest, ChatResponse, ContentBlock, FinishReason, Message, ProviderAdapter,
    ProviderError, Role, ToolCall, ToolChoice, Usage,
};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

/// Static USD-per-million-token pricing. Prefix-matched against the model
/// name since OpenAI frequently ships dated snapshot aliases
/// (`gpt-4o-2024-08-06`) for one priced family.
const RATES: &[(&str, f64, f64)] = &[
    ("gpt-4o-mini", 0.15, 0.60),
    ("gpt-4o", 2.50, 10.00),
    ("gpt-4.1-mini", 0.40, 1.60),
    ("gpt-4.1", 2.00, 8.00),
    ("o3-mini", 1.10, 4.40),
    ("o3", 10.00, 40.00),
    ("gpt-3.5-turbo", 0.50, 1.50),
];
const DEFAULT_RATE: (f64, f64) = (5.00, 15.00);

pub struct OpenAiConfig {
    pub api_key: String,
    pub base_url: Url,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        OpenAiConfig {
            api_key: api_key.into(),
            base_url: Url::parse("https://api.openai.com/v1/").unwrap(),
        }
    }
}

pub struct OpenAiAdapter {
    config: OpenAiConfig,
    client: reqwest::Client,
}

impl OpenAiAdapter {
    pub fn new(config: OpenAiConfig) -> Self {
        OpenAiAdapter { config, client: reqwest::Client::new() }
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall<'a>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<&'a str>,
}

#[derive(Serialize)]
struct WireToolCall<'a> {
    id: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireFunction<'a>,
}

#[derive(Serialize)]
struct WireFunction<'a> {
    name: &'a str,
    arguments: String,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: WireToolFunction<'a>,
}

#[derive(Serialize)]
struct WireToolFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<Value>,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Usage,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ResponseToolCall>,
}

#[derive(Deserialize)]
struct ResponseToolCall {
    id: String,
    function: ResponseFunctionCall,
}

#[derive(Deserialize)]
struct ResponseFunctionCall {
    name: String,
    arguments: String,
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
        Role::Function => "function",
    }
}

fn to_wire_message(message: &Message) -> WireMessage<'_> {
    // Tool- and Function-role messages always carry exactly one ToolResult
    // block; any other role is flattened to its concatenated text plus its
    // tool calls.
    if let Role::Tool | Role::Function = message.role {
        if let Some(ContentBlock::ToolResult { tool_call_id, content, .. }) = message.content.first() {
            return WireMessage {
                role: role_str(message.role),
                content: Some(content.clone()),
                tool_calls: None,
                tool_call_id: Some(tool_call_id),
            };
        }
    }

    let tool_calls: Vec<WireToolCall> = message
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolUse { call } => Some(WireToolCall {
                id: &call.id,
                kind: "function",
                function: WireFunction { name: &call.name, arguments: call.arguments.to_string() },
            }),
            _ => None,
        })
        .collect();

    WireMessage {
        role: role_str(message.role),
        content: if message.text().is_empty() { None } else { Some(message.text()) },
        tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
        tool_call_id: None,
    }
}

fn finish_reason_from(raw: Option<&str>) -> FinishReason {
    match raw {
        Some("stop") => FinishReason::Stop,
        Some("length") => FinishReason::Length,
        Some("content_filter") => FinishReason::ContentFilter,
        Some("tool_calls") => FinishReason::ToolCalls,
        _ => FinishReason::Other,
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiAdapter {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn model_prefixes(&self) -> &'static [&'static str] {
        &["gpt-", "o1-", "o3-", "o4-", "chatgpt-"]
    }

    async fn generate_response(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let tools: Vec<WireTool> = request
            .tools
            .iter()
            .map(|t| WireTool {
                kind: "function",
                function: WireToolFunction { name: &t.name, description: &t.description, parameters: &t.parameters },
            })
            .collect();

        let tool_choice = request.tool_choice.as_ref().map(|choice| match choice {
            ToolChoice::Auto => json!("auto"),
            ToolChoice::Any => json!("required"),
            ToolChoice::None => json!("none"),
            ToolChoice::Tool(name) => json!({"type": "function", "function": {"name": name}}),
        });

        let response_format = request.structured_output.as_ref().map(|spec| {
            json!({
                "type": "json_schema",
                "json_schema": {"name": spec.name, "schema": spec.schema, "strict": spec.strict}
            })
        });

        let body = ChatCompletionRequest {
            model: &request.model,
            messages: request.messages.iter().map(to_wire_message).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            tools,
            tool_choice,
            response_format,
        };

        let url = self.config.base_url.join("chat/completions")?;
        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.config.api_key))
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let raw_text = response.text().await?;

        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ProviderError::AuthenticationError(raw_text));
        }
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = None;
            return Err(ProviderError::RateLimitError { message: raw_text, retry_after });
        }
        if !status.is_success() {
            return Err(ProviderError::ProviderError { message: format!("HTTP {status}"), raw_response: Some(raw_text), retryable: status.is_server_error() });
        }

        let raw: Value = serde_json::from_str(&raw_text)?;
        let parsed: ChatCompletionResponse = serde_json::from_value(raw.clone())?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ProviderError { message: "empty choices array".into(), raw_response: Some(raw_text.clone()), retryable: false })?;

        let tool_calls = choice
            .message
            .tool_calls
            .into_iter()
            .map(|tc| -> Result<ToolCall, ProviderError> {
                let arguments: Value = serde_json::from_str(&tc.function.arguments).unwrap_or(Value::Null);
                Ok(ToolCall { id: tc.id, name: tc.function.name, arguments })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ChatResponse {
            text: choice.message.content.unwrap_or_default(),
            tool_calls,
            finish_reason: finish_reason_from(choice.finish_reason.as_deref()),
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
    use llmflow_core::ToolDefinition;

    #[test]
    fn tool_message_round_trips_as_tool_role() {
        let msg = Message::tool_result("call_1", "42", false);
        let wire = to_wire_message(&msg);
        assert_eq!(wire.role, "tool");
        assert_eq!(wire.tool_call_id, Some("call_1"));
        assert_eq!(wire.content.as_deref(), Some("42"));
    }

    #[test]
    fn estimate_cost_uses_longest_matching_prefix() {
        let adapter = OpenAiAdapter::new(OpenAiConfig::new("k"));
        let usage = Usage { input_tokens: 1_000_000, output_tokens: 1_000_000 };
        assert_eq!(adapter.estimate_cost("gpt-4o-mini-2024", &usage), 0.15 + 0.60);
        assert_eq!(adapter.estimate_cost("gpt-4o-2024", &usage), 2.50 + 10.00);
    }

    #[test]
    fn unknown_model_falls_back_to_default_rate() {
        let adapter = OpenAiAdapter::new(OpenAiConfig::new("k"));
        let usage = Usage { input_tokens: 1_000_000, output_tokens: 0 };
        assert_eq!(adapter.estimate_cost("some-future-model", &usage), DEFAULT_RATE.0);
    }

    #[test]
    fn tool_choice_tool_serializes_function_name() {
        let _unused = ToolDefinition { name: "x".into(), description: "d".into(), parameters: json!({}) };
        match ToolChoice::Tool("lookup".into()) {
            ToolChoice::Tool(name) => assert_eq!(name, "lookup"),
            _ => panic!("expected Tool variant"),
        }
    }
}
