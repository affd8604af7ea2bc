use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Role of a participant in a chat exchange. `Tool` carries the result of a
/// tool invocation back to the model; `Function` is the legacy single-
/// function-call role some providers and stored transcripts still use
/// (`spec.md` §3 `Message.role`, §4.D). Provider adapters are responsible
/// for translating either into whatever wire shape that provider expects
/// (a dedicated role, a content block, or a synthetic user turn).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
    Function,
}

/// The supported MIME type of an inlined image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ImageMime {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageMime {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageMime::Jpeg => "image/jpeg",
            ImageMime::Png => "image/png",
            ImageMime::Gif => "image/gif",
            ImageMime::Webp => "image/webp",
        }
    }
}

/// A single call the model asked the caller to perform.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Arguments as a JSON object; adapters are responsible for parsing the
    /// provider's native representation (some send a JSON string, some a
    /// pre-parsed object) into this value.
    pub arguments: serde_json::Value,
}

/// One content unit inside a message. A message is a `Vec<ContentBlock>`
/// rather than a single string so multimodal turns and tool exchanges share
/// one representation across every provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentBlock {
    Text { text: String },
    Image { mime: ImageMime, data: Vec<u8> },
    ImageUrl { url: String },
    ToolUse { call: ToolCall },
    ToolResult {
        tool_call_id: String,
        content: String,
        is_error: bool,
    },
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text { text: text.into() }
    }
}

/// A single message in a conversation transcript.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Message { role: Role::System, content: vec![ContentBlock::text(text)] }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Message { role: Role::User, content: vec![ContentBlock::text(text)] }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Message { role: Role::Assistant, content: vec![ContentBlock::text(text)] }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>, is_error: bool) -> Self {
        Message {
            role: Role::Tool,
            content: vec![ContentBlock::ToolResult {
                tool_call_id: tool_call_id.into(),
                content: content.into(),
                is_error,
            }],
        }
    }

    /// Concatenation of every text block, for callers that only care about
    /// the plain-text content (ledger display, template rendering).
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Token accounting for a single provider call. Field names mirror the
/// aliases different providers use on the wire so adapters can deserialize
/// straight into this type.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    #[serde(alias = "prompt_tokens", alias = "promptTokenCount")]
    pub input_tokens: u32,
    #[serde(alias = "completion_tokens", alias = "candidatesTokenCount")]
    pub output_tokens: u32,
}

impl Usage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Why the provider stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Error,
    Other,
}

/// A JSON-Schema-shaped tool definition offered to the model.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// How the model should choose among offered tools.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ToolChoice {
    Auto,
    Any,
    None,
    Tool(String),
}

/// A structured-output request: the model's response must validate against
/// this JSON Schema, and `strict` asks providers that support it to enforce
/// that at generation time rather than merely at our validation step.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StructuredOutputSpec {
    pub name: String,
    pub schema: serde_json::Value,
    pub strict: bool,
}

/// A fully assembled request to a provider adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured_output: Option<StructuredOutputSpec>,
    /// Provider-specific overrides that don't have a canonical home
    /// (e.g. OpenAI's `top_p`, Anthropic's `thinking` budget).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, serde_json::Value>,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        ChatRequest {
            model: model.into(),
            messages,
            tools: Vec::new(),
            tool_choice: None,
            max_tokens: None,
            temperature: None,
            structured_output: None,
            extra: HashMap::new(),
        }
    }
}

/// A normalized response from a provider adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    /// The provider's raw JSON payload, kept for the ledger's
    /// `response_raw` column and for debugging malformed responses.
    pub raw: serde_json::Value,
}

/// A request for image generation (`spec.md` §4.B/§4.D, `[optional]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub size: Option<String>,
    pub quality: Option<String>,
    pub style: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResponse {
    /// One URL or base64 payload per generated image, provider-dependent.
    pub images: Vec<String>,
    pub raw: serde_json::Value,
}

/// A request for speech synthesis (`spec.md` §4.B/§4.D, `[optional]`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioRequest {
    pub text: String,
    pub voice: String,
    pub format: Option<String>,
    pub speed: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioResponse {
    pub audio: Vec<u8>,
    pub mime_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_accepts_provider_aliases() {
        let v: Usage = serde_json::from_str(r#"{"prompt_tokens": 10, "completion_tokens": 5}"#).unwrap();
        assert_eq!(v.input_tokens, 10);
        assert_eq!(v.output_tokens, 5);
        assert_eq!(v.total(), 15);
    }

    #[test]
    fn message_text_concatenates_text_blocks_only() {
        let m = Message {
            role: Role::Assistant,
            content: vec![
                ContentBlock::text("hello "),
                ContentBlock::ToolUse {
                    call: ToolCall { id: "1".into(), name: "x".into(), arguments: serde_json::json!({}) },
                },
                ContentBlock::text("world"),
            ],
        };
        assert_eq!(m.text(), "hello world");
    }
}
