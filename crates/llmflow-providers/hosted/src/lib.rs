//! The "hosted" provider: a self-hosted, OpenAI-wire-compatible endpoint
//! (vLLM, TGI, or an in-house inference gateway) that has no public
//! pricing feed of its own.
//!
//! `SPEC_FULL.md` §4.B calls this "a fictional hosted variant" -- grounded
//! on the teacher's OpenRouter adapter, which shows the same pattern of
//! reusing the OpenAI wire format against an arbitrary base URL rather
//! than inventing a new one.

use async_trait::async_trait;
use llmflow_core::{ChatRequest, ChatResponse, ProviderAdapter, ProviderError, Usage};
use llmflow_providers_openai::{OpenAiAdapter, OpenAiConfig};
use url::Url;

pub struct HostedAdapter {
    inner: OpenAiAdapter,
    /// Internal infrastructure has no metered per-token billing; cost is
    /// reported as zero rather than a guessed external rate.
    cost_per_million_input: f64,
    cost_per_million_output: f64,
}

impl HostedAdapter {
    pub fn new(base_url: Url, api_key: impl Into<String>) -> Self {
        let mut config = OpenAiConfig::new(api_key);
        config.base_url = base_url;
        HostedAdapter { inner: OpenAiAdapter::new(config), cost_per_million_input: 0.0, cost_per_million_output: 0.0 }
    }

    pub fn with_cost_rates(mut self, input_per_million: f64, output_per_million: f64) -> Self {
        self.cost_per_million_input = input_per_million;
        self.cost_per_million_output = output_per_million;
        self
    }
}

#[async_trait]
impl ProviderAdapter for HostedAdapter {
    fn name(&self) -> &'static str {
        "hosted"
    }

    fn model_prefixes(&self) -> &'static [&'static str] {
        &["hosted/"]
    }

    async fn generate_response(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut upstream = request.clone();
        upstream.model = request.model.trim_start_matches("hosted/").to_string();
        self.inner.generate_response(&upstream).await
    }

    fn estimate_cost(&self, _model: &str, usage: &Usage) -> f64 {
        (usage.input_tokens as f64 / 1_000_000.0) * self.cost_per_million_input
            + (usage.output_tokens as f64 / 1_000_000.0) * self.cost_per_million_output
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_zero_cost_for_internal_infrastructure() {
        let adapter = HostedAdapter::new(Url::parse("http://localhost:8000/v1/").unwrap(), "");
        let usage = Usage { input_tokens: 1_000_000, output_tokens: 1_000_000 };
        assert_eq!(adapter.estimate_cost("hosted/llama-3-70b", &usage), 0.0);
    }

    #[test]
    fn with_cost_rates_overrides_the_default() {
        let adapter = HostedAdapter::new(Url::parse("http://localhost:8000/v1/").unwrap(), "").with_cost_rates(1.0, 2.0);
        let usage = Usage { input_tokens: 1_000_000, output_tokens: 1_000_000 };
        assert_eq!(adapter.estimate_cost("hosted/llama-3-70b", &usage), 3.0);
    }
}
