use llmflow_core::ProviderError;
use llmflow_ledger::LedgerError;

/// Tunables for the façade that don't belong on any single call (`spec.md`
/// §4.D): default model/sampling settings and the retry schedule handed to
/// `llmflow_core::retry::call_with_retry`.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub default_model: String,
    pub default_temperature: Option<f32>,
    pub default_max_output_tokens: Option<u32>,
    pub max_retries: u32,
    pub retry_base_wait_secs: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            default_model: "gpt-4o-mini".to_owned(),
            default_temperature: None,
            default_max_output_tokens: None,
            max_retries: 3,
            retry_base_wait_secs: 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error("structured output did not validate: {0}")]
    StructuredOutputInvalid(String),
}
