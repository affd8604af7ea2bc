use async_trait::async_trait;

use crate::error::ProviderError;
use crate::message::{AudioRequest, AudioResponse, ChatRequest, ChatResponse, ImageRequest, ImageResponse, Usage};

/// Shared behavior every provider adapter implements. Ledger bookkeeping,
/// retry/backoff, and response caching all live once in `llmflow-service`
/// rather than being duplicated per adapter (see `SPEC_FULL.md` §4.B) --
/// an adapter's only job is to speak one vendor's wire protocol.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Short identifier used in logs and in the ledger's `provider` column
    /// (e.g. `"openai"`, `"anthropic"`).
    fn name(&self) -> &'static str;

    /// Model name prefixes this adapter serves, used by the routing table
    /// for longest-prefix-match dispatch (e.g. `["gpt-", "o1-", "o3-"]`).
    fn model_prefixes(&self) -> &'static [&'static str];

    /// Issue a single request and return a normalized response.
    async fn generate_response(&self, request: &ChatRequest) -> Result<ChatResponse, ProviderError>;

    /// Estimate the USD cost of a call against `model` given its token
    /// usage. Adapters own a static per-model rate table; an unknown model
    /// falls back to the adapter's own documented default rather than
    /// silently returning zero.
    fn estimate_cost(&self, model: &str, usage: &Usage) -> f64;

    /// Image generation (`spec.md` §4.B, `[optional]`). Adapters that don't
    /// offer an image endpoint inherit this default, which fails closed
    /// with `ConfigurationError` rather than silently no-op'ing.
    async fn generate_image(&self, _request: &ImageRequest) -> Result<ImageResponse, ProviderError> {
        Err(ProviderError::ConfigurationError(format!("{} does not support image generation", self.name())))
    }

    /// Speech synthesis (`spec.md` §4.B, `[optional]`). Same default-
    /// unsupported contract as `generate_image`.
    async fn generate_audio(&self, _request: &AudioRequest) -> Result<AudioResponse, ProviderError> {
        Err(ProviderError::ConfigurationError(format!("{} does not support audio generation", self.name())))
    }
}

/// True if `model` is served by an adapter offering `prefixes`, using the
/// longest match among them (so `"gpt-4o-mini"` prefers a more specific
/// prefix entry over a shorter generic one if both are registered).
pub fn prefix_match_len(model: &str, prefixes: &[&str]) -> Option<usize> {
    prefixes
        .iter()
        .filter(|p| model.starts_with(**p))
        .map(|p| p.len())
        .max()
}
