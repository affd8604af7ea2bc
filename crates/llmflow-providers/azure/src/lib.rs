//! Azure OpenAI Service adapter.
//!
//! Azure OpenAI is wire-compatible with OpenAI's Chat Completions endpoint
//! (same request/response body), differing only in how the endpoint is
//! addressed: a per-resource base URL with a `/openai/deployments/<name>`
//! path segment, an `api-version` query parameter, and an `api-key` header
//! in place of `Authorization: Bearer` -- grounded on the teacher's
//! `OpenAIProviderConfig` trait (`providers/openai/src/api.rs`), which
//! already treats auth header shape as a per-config concern rather than
//! something hardcoded into the request builder.

use async_trait::async_trait;
use llmflow_core::{
    ChatRequest, ChatResponse, FinishReason, Message, ProviderAdapter, ProviderError, Role,
    ToolCall, Usage,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

pub struct AzureConfig {
    pub api_key: String,
    /// e.g. `https://my-resource.openai.azure.com/`
    pub resource_base_url: Url,
    pub deployment: String,
    pub api_version: String,
}

impl AzureConfig {
    pub fn new(api_key: impl Into<String>, resource_base_url: Url, deployment: impl Into<String>) -> Self {
        AzureConfig {
            api_key: api_key.into(),
            resource_base_url,
            deployment: deployment.into(),
            api_version: "2024-06-01".to_string(),
        }
    }
}

pub struct AzureAdapter {
    config: AzureConfig,
    client: reqwest::Client,
}

impl AzureAdapter {
    pub fn new(config: AzureConfig) -> Self {
        AzureAdapter { config, client: reqwest::Client::new() }
    }

    fn endpoint_url(&self) -> Result<Url, ProviderError> {
        let path = format!("openai/deployments/{}/chat/completions", self.config.deployment);
        let mut url = self.config.resource_base_url.join(&path)?;
        url.query_pairs_mut().append_pair("api-version", &self.config.api_version);
        Ok(url)
    }
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
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
    WireMessage { role: role_str(message.role), content: message.text() }
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
impl ProviderAdapter for AzureAdapter {
    fn name(&self) -> &'static str {
        "azure"
    }

    fn model_prefixes(&self) -> &'static [&'static str] {
        &["azure/"]
    }

    async fn generate_response(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let body = ChatCompletionRequest {
            messages: request.messages.iter().map(to_wire_message).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let response = self
            .client
            .post(self.endpoint_url()?)
            .header("api-key", &self.config.api_key)
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
        let parsed: ChatCompletionResponse = serde_json::from_value(raw.clone())?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::ProviderError { message: "empty choices array".into(), raw_response: Some(raw_text.clone()), retryable: false })?;

        Ok(ChatResponse {
            text: choice.message.content.unwrap_or_default(),
            tool_calls: Vec::<ToolCall>::new(),
            finish_reason: finish_reason_from(choice.finish_reason.as_deref()),
            usage: parsed.usage,
            raw,
        })
    }

    fn estimate_cost(&self, _model: &str, usage: &Usage) -> f64 {
        // Azure bills through the customer's own enterprise agreement
        // rate card, which this port has no API access to; it applies the
        // same blended default the OpenAI adapter uses for unrecognized
        // models rather than claiming false precision.
        (usage.input_tokens as f64 / 1_000_000.0) * 5.00 + (usage.output_tokens as f64 / 1_000_000.0) * 15.00
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_url_includes_deployment_and_api_version() {
        let adapter = AzureAdapter::new(AzureConfig::new(
            "key",
            Url::parse("https://my-resource.openai.azure.com/").unwrap(),
            "gpt-4o-mini",
        ));
        let url = adapter.endpoint_url().unwrap();
        assert!(url.as_str().contains("openai/deployments/gpt-4o-mini/chat/completions"));
        assert!(url.query().unwrap().contains("api-version=2024-06-01"));
    }
}
