//! Google Gemini `generateContent` adapter.
//!
//! Wire shape grounded on the teacher's `crates/google` adapter: requests
//! are `contents: [{role, parts: [...]}]` with the API key passed as a
//! query parameter rather than a header, and tool calls arrive as
//! `functionCall` parts inside a candidate's content.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use llmflow_core::{
    ChatRequest, ChatResponse, ContentBlock, FinishReason, Message, ProviderAdapter, ProviderError,
    Role, ToolCall, Usage,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use url::Url;

const RATES: &[(&str, f64, f64)] = &[
    ("gemini-1.5-flash", 0.075, 0.30),
    ("gemini-1.5-pro", 1.25, 5.00),
    ("gemini-2.0-flash", 0.10, 0.40),
    ("gemini-2.5-flash", 0.15, 0.60),
    ("gemini-2.5-pro", 1.25, 10.00),
];
const DEFAULT_RATE: (f64, f64) = (1.25, 5.00);

pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: Url,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        GeminiConfig {
            api_key: api_key.into(),
            base_url: Url::parse("https://generativelanguage.googleapis.com/v1beta/").unwrap(),
        }
    }
}

pub struct GeminiAdapter {
    config: GeminiConfig,
    client: reqwest::Client,
}

impl GeminiAdapter {
    pub fn new(config: GeminiConfig) -> Self {
        GeminiAdapter { config, client: reqwest::Client::new() }
    }
}

#[derive(Serialize)]
#[serde(untagged)]
enum WirePart {
    Text { text: String },
    InlineData { inline_data: InlineData },
    FunctionCall { #[serde(rename = "functionCall")] function_call: FunctionCallPart },
    FunctionResponse { #[serde(rename = "functionResponse")] function_response: FunctionResponsePart },
}

#[derive(Serialize)]
struct InlineData {
    mime_type: &'static str,
    data: String,
}

#[derive(Serialize)]
struct FunctionCallPart {
    name: String,
    args: Value,
}

#[derive(Serialize)]
struct FunctionResponsePart {
    name: String,
    response: Value,
}

#[derive(Serialize)]
struct WireContent {
    role: &'static str,
    parts: Vec<WirePart>,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Serialize)]
struct FunctionDeclaration<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

#[derive(Serialize)]
struct WireTool<'a> {
    #[serde(rename = "functionDeclarations")]
    function_declarations: Vec<FunctionDeclaration<'a>>,
}

#[derive(Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<WireContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<WireContent>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata", default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Deserialize, Default)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    candidates_token_count: u32,
}

#[derive(Deserialize)]
struct Candidate {
    content: ResponseContent,
    #[serde(rename = "finishReason", default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
    #[serde(rename = "functionCall", default)]
    function_call: Option<ResponseFunctionCall>,
}

#[derive(Deserialize)]
struct ResponseFunctionCall {
    name: String,
    args: Value,
}

fn block_to_part(block: &ContentBlock) -> WirePart {
    match block {
        ContentBlock::Text { text } => WirePart::Text { text: text.clone() },
        ContentBlock::Image { mime, data } => {
            WirePart::InlineData { inline_data: InlineData { mime_type: mime.mime_type(), data: BASE64.encode(data) } }
        }
        ContentBlock::ImageUrl { url } => WirePart::Text { text: format!("[image: {url}]") },
        ContentBlock::ToolUse { call } => {
            WirePart::FunctionCall { function_call: FunctionCallPart { name: call.name.clone(), args: call.arguments.clone() } }
        }
        ContentBlock::ToolResult { content, .. } => WirePart::FunctionResponse {
            function_response: FunctionResponsePart {
                name: String::new(),
                response: json!({ "content": content }),
            },
        },
    }
}

fn split_system_and_turns(messages: &[Message]) -> (Option<WireContent>, Vec<WireContent>) {
    let mut system_parts = Vec::new();
    let mut turns = Vec::new();

    for message in messages {
        match message.role {
            Role::System => system_parts.push(message.text()),
            Role::User | Role::Tool | Role::Function => turns.push(WireContent { role: "user", parts: message.content.iter().map(block_to_part).collect() }),
            Role::Assistant => turns.push(WireContent { role: "model", parts: message.content.iter().map(block_to_part).collect() }),
        }
    }

    let system = if system_parts.is_empty() {
        None
    } else {
        Some(WireContent { role: "user", parts: vec![WirePart::Text { text: system_parts.join("\n\n") }] })
    };
    (system, turns)
}

fn finish_reason_from(raw: Option<&str>) -> FinishReason {
    match raw {
        Some("STOP") => FinishReason::Stop,
        Some("MAX_TOKENS") => FinishReason::Length,
        Some("SAFETY") | Some("RECITATION") => FinishReason::ContentFilter,
        _ => FinishReason::Other,
    }
}

#[async_trait]
impl ProviderAdapter for GeminiAdapter {
    fn name(&self) -> &'static str {
        "gemini"
    }

    fn model_prefixes(&self) -> &'static [&'static str] {
        &["gemini-"]
    }

    async fn generate_response(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let (system_instruction, contents) = split_system_and_turns(&request.messages);

        let tools: Vec<WireTool> = if request.tools.is_empty() {
            Vec::new()
        } else {
            vec![WireTool {
                function_declarations: request
                    .tools
                    .iter()
                    .map(|t| FunctionDeclaration { name: &t.name, description: &t.description, parameters: &t.parameters })
                    .collect(),
            }]
        };

        let body = GenerateContentRequest {
            contents,
            system_instruction,
            generation_config: GenerationConfig { max_output_tokens: request.max_tokens, temperature: request.temperature },
            tools,
        };

        let path = format!("models/{}:generateContent", request.model);
        let mut url = self.config.base_url.join(&path)?;
        url.query_pairs_mut().append_pair("key", &self.config.api_key);

        let response = self.client.post(url).json(&body).send().await?;
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
        let parsed: GenerateContentResponse = serde_json::from_value(raw.clone())?;
        let candidate = parsed
            .candidates
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ProviderError { message: "no candidates in response".into(), raw_response: Some(raw_text.clone()), retryable: false })?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for (idx, part) in candidate.content.parts.into_iter().enumerate() {
            if let Some(t) = part.text {
                text.push_str(&t);
            }
            if let Some(fc) = part.function_call {
                tool_calls.push(ToolCall { id: format!("call_{idx}"), name: fc.name, arguments: fc.args });
            }
        }

        let usage = parsed.usage_metadata.unwrap_or_default();

        Ok(ChatResponse {
            text,
            tool_calls,
            finish_reason: finish_reason_from(candidate.finish_reason.as_deref()),
            usage: Usage { input_tokens: usage.prompt_token_count, output_tokens: usage.candidates_token_count },
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
    fn system_messages_become_a_system_instruction_block() {
        let messages = vec![Message::system("be terse"), Message::user("hi")];
        let (system, turns) = split_system_and_turns(&messages);
        assert!(system.is_some());
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0].role, "user");
    }

    #[test]
    fn assistant_role_maps_to_model() {
        let messages = vec![Message::assistant("ok")];
        let (_, turns) = split_system_and_turns(&messages);
        assert_eq!(turns[0].role, "model");
    }
}
