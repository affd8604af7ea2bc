use std::future::Future;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::error::ProviderError;

/// Governs how many times, and how long, a failed provider call is retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub default_wait_secs: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_retries: 3,
            default_wait_secs: 1,
            backoff_multiplier: 2.0,
        }
    }
}

/// Runs `call_fn` with retry on rate limits and transient HTTP failures,
/// honoring `cancel_token` between attempts and during backoff waits.
///
/// Grounded on the teacher's `agent::execution::llm_retry::call_llm_with_retry`:
/// rate limits back off using the provider's advertised `retry_after` when
/// present, otherwise an exponential `default_wait_secs * multiplier^(n-1)`
/// schedule; cancellation aborts immediately rather than finishing the
/// current wait.
#[instrument(name = "llmflow.retry.call_with_retry", skip(policy, cancel_token, call_fn))]
pub async fn call_with_retry<F, Fut, T>(
    policy: &RetryPolicy,
    cancel_token: &CancellationToken,
    mut call_fn: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        if cancel_token.is_cancelled() {
            return Err(ProviderError::TimeoutError("cancelled before attempt".into()));
        }

        match call_fn().await {
            Ok(value) => return Ok(value),
            Err(ProviderError::RateLimitError { message, retry_after }) => {
                if attempt >= policy.max_retries {
                    return Err(ProviderError::RateLimitError { message, retry_after });
                }
                let wait_secs = retry_after.unwrap_or_else(|| {
                    (policy.default_wait_secs as f64 * policy.backoff_multiplier.powi((attempt - 1) as i32)) as u64
                });
                info!(attempt, wait_secs, "rate limited, backing off");
                if wait_with_cancellation(wait_secs, cancel_token).await {
                    return Err(ProviderError::TimeoutError("cancelled during rate limit wait".into()));
                }
            }
            Err(e) if is_transient(&e) && attempt < policy.max_retries => {
                let wait_secs = policy.default_wait_secs * 2u64.saturating_pow(attempt - 1);
                debug!(attempt, wait_secs, error = %e, "transient error, retrying");
                if wait_with_cancellation(wait_secs, cancel_token).await {
                    return Err(ProviderError::TimeoutError("cancelled during retry wait".into()));
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Waits `wait_secs`, returning `true` if `cancel_token` fired first.
async fn wait_with_cancellation(wait_secs: u64, cancel_token: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(std::time::Duration::from_secs(wait_secs)) => false,
        _ = cancel_token.cancelled() => true,
    }
}

/// Connection-level failures, timeouts, and 5xx responses are worth
/// retrying (`spec.md` §4.B step 3, §7); validation, auth, and
/// configuration errors are not -- retrying them would just repeat the
/// same failure.
fn is_transient(e: &ProviderError) -> bool {
    match e {
        ProviderError::TimeoutError(_) => true,
        ProviderError::ProviderError { retryable, .. } => *retryable,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn retries_rate_limit_until_success() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy { max_retries: 3, default_wait_secs: 1, backoff_multiplier: 2.0 };
        let cancel = CancellationToken::new();

        let result = call_with_retry(&policy, &cancel, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ProviderError::RateLimitError { message: "slow down".into(), retry_after: Some(1) })
                } else {
                    Ok(42)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let policy = RetryPolicy { max_retries: 2, default_wait_secs: 0, backoff_multiplier: 1.0 };
        let cancel = CancellationToken::new();

        let result: Result<(), ProviderError> = call_with_retry(&policy, &cancel, || async {
            Err(ProviderError::RateLimitError { message: "nope".into(), retry_after: Some(0) })
        })
        .await;

        assert!(matches!(result, Err(ProviderError::RateLimitError { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_retryable_provider_error_until_success() {
        let policy = RetryPolicy { max_retries: 3, default_wait_secs: 1, backoff_multiplier: 2.0 };
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result = call_with_retry(&policy, &cancel, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(ProviderError::ProviderError { message: "HTTP 503".into(), raw_response: None, retryable: true })
                } else {
                    Ok(7)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(result, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn non_transient_error_is_not_retried() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);

        let result: Result<(), ProviderError> = call_with_retry(&policy, &cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::ValidationError("bad input".into())) }
        })
        .await;

        assert!(matches!(result, Err(ProviderError::ValidationError(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
