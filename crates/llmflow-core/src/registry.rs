use std::sync::Arc;

use crate::error::ProviderError;
use crate::provider::{prefix_match_len, ProviderAdapter};

/// Resolves a model name to the adapter that serves it via a precomputed
/// longest-prefix-match table, built once at construction time instead of
/// an if/else cascade scattered across call sites (`SPEC_FULL.md` §4.D,
/// REDESIGN FLAGS: replace the cyclic-fallback prefix chain with a single
/// lookup table).
pub struct ProviderRegistry {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new(adapters: Vec<Arc<dyn ProviderAdapter>>) -> Self {
        ProviderRegistry { adapters }
    }

    /// Look up the adapter serving `model`, returning a `ConfigurationError`
    /// when none matches rather than silently falling back to some default
    /// provider.
    pub fn resolve(&self, model: &str) -> Result<Arc<dyn ProviderAdapter>, ProviderError> {
        self.adapters
            .iter()
            .filter_map(|adapter| {
                prefix_match_len(model, adapter.model_prefixes()).map(|len| (len, adapter))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, adapter)| Arc::clone(adapter))
            .ok_or_else(|| {
                ProviderError::ConfigurationError(format!(
                    "no provider adapter is configured for model `{model}`"
                ))
            })
    }

    pub fn adapters(&self) -> &[Arc<dyn ProviderAdapter>] {
        &self.adapters
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{ChatRequest, ChatResponse, FinishReason, Usage};
    use async_trait::async_trait;

    struct Fake {
        name: &'static str,
        prefixes: &'static [&'static str],
    }

    #[async_trait]
    impl ProviderAdapter for Fake {
        fn name(&self) -> &'static str {
            self.name
        }
        fn model_prefixes(&self) -> &'static [&'static str] {
            self.prefixes
        }
        async fn generate_response(&self, _request: &ChatRequest) -> Result<ChatResponse, ProviderError> {
            Ok(ChatResponse {
                text: String::new(),
                tool_calls: vec![],
                finish_reason: FinishReason::Stop,
                usage: Usage::default(),
                raw: serde_json::Value::Null,
            })
        }
        fn estimate_cost(&self, _model: &str, _usage: &Usage) -> f64 {
            0.0
        }
    }

    #[test]
    fn resolves_longest_matching_prefix() {
        let generic = Arc::new(Fake { name: "generic", prefixes: &["gpt-"] });
        let specific = Arc::new(Fake { name: "specific", prefixes: &["gpt-4o-"] });
        let registry = ProviderRegistry::new(vec![generic, specific]);

        let resolved = registry.resolve("gpt-4o-mini").unwrap();
        assert_eq!(resolved.name(), "specific");
    }

    #[test]
    fn unmatched_model_is_a_configuration_error() {
        let registry = ProviderRegistry::new(vec![Arc::new(Fake { name: "openai", prefixes: &["gpt-"] })]);
        let err = registry.resolve("claude-3-opus").unwrap_err();
        assert!(matches!(err, ProviderError::ConfigurationError(_)));
    }
}
