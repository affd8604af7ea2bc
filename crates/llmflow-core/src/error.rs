/// Canonical error taxonomy shared by every provider adapter and by the
/// service/flow/conversation layers built on top of them.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Invalid or missing credentials, or a provider-rejected auth header.
    #[error("authentication error: {0}")]
    AuthenticationError(String),
    /// Provider signaled rate limiting; `retry_after` is the provider's
    /// advertised wait in seconds, when it gave one.
    #[error("rate limited: {message}")]
    RateLimitError {
        message: String,
        retry_after: Option<u64>,
    },
    /// A request exceeded its deadline before the provider responded.
    #[error("timeout: {0}")]
    TimeoutError(String),
    /// Caller-supplied input failed validation before any network call.
    #[error("validation error: {0}")]
    ValidationError(String),
    /// The provider responded with an error, or a response we could not
    /// make sense of. `retryable` is set for connection failures and 5xx
    /// responses (`spec.md` §4.B/§7); a 4xx or a malformed-body failure
    /// is not.
    #[error("provider error: {message}")]
    ProviderError {
        message: String,
        raw_response: Option<String>,
        retryable: bool,
    },
    /// No adapter is configured for the requested model, or a required
    /// setting (API key, base URL) is missing.
    #[error("configuration error: {0}")]
    ConfigurationError(String),
}

impl ProviderError {
    /// Stable taxonomy tag for the ledger's `error_type` column and for
    /// admin dashboards, independent of the (freeform) `Display` message.
    pub fn type_name(&self) -> &'static str {
        match self {
            ProviderError::AuthenticationError(_) => "authentication_error",
            ProviderError::RateLimitError { .. } => "rate_limit_error",
            ProviderError::TimeoutError(_) => "timeout_error",
            ProviderError::ValidationError(_) => "validation_error",
            ProviderError::ProviderError { .. } => "provider_error",
            ProviderError::ConfigurationError(_) => "configuration_error",
        }
    }

    /// Whether this error carries a vendor-advertised retry delay.
    pub fn retry_after(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimitError { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::TimeoutError(err.to_string())
        } else {
            let retryable = err.is_connect();
            ProviderError::ProviderError {
                message: err.to_string(),
                raw_response: None,
                retryable,
            }
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::ProviderError {
            message: format!("{err} at line {} column {}", err.line(), err.column()),
            raw_response: None,
            retryable: false,
        }
    }
}

impl From<url::ParseError> for ProviderError {
    fn from(err: url::ParseError) -> Self {
        ProviderError::ConfigurationError(format!("invalid url: {err}"))
    }
}

/// Errors raised by the flow/conversation orchestration layers for
/// conditions that are not provider-facing (missing execution context,
/// tool-loop exhaustion, unbound template variables).
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("template variable `{0}` is not bound in step inputs")]
    UnboundTemplateVariable(String),
    #[error("tool call loop exhausted after {0} iterations without a final response")]
    ToolLoopExhausted(usize),
    #[error("no execution context is bound on this task")]
    MissingContext,
    #[error("step `{0}` produced no output for downstream steps to consume")]
    MissingStepOutput(String),
    #[error("input validation failed: {0}")]
    ValidationError(String),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
