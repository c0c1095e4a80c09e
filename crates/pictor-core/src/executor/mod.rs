//! Shared request executor: rate limiting, retries, and cost accounting.
//!
//! Every outbound provider call in the pipeline goes through
//! [`RequestExecutor::execute`]. The executor claims a slot in the
//! provider's rate window, runs the call, classifies failures through the
//! retry policy, and records billing usage in the cost ledger on success.

mod ledger;
mod rate_limit;
mod retry;

pub use ledger::{CallOutcome, CostLedger, Usage};
pub use rate_limit::RateLimiter;
pub use retry::{RetryDecision, RetryPolicy};

use crate::config::{RateLimitConfig, RetryConfig};
use crate::error::{ApiError, ExecutorError};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Coordinates all outbound calls for one run.
///
/// Cheap to clone via `Arc`; each stage holds a reference to the same
/// executor so rate limits and the ledger are shared run-wide.
pub struct RequestExecutor {
    limiters: HashMap<String, RateLimiter>,
    policy: RetryPolicy,
    ledger: Arc<CostLedger>,
}

impl RequestExecutor {
    pub fn new(retry: &RetryConfig) -> Self {
        Self {
            limiters: HashMap::new(),
            policy: RetryPolicy::new(retry),
            ledger: Arc::new(CostLedger::new()),
        }
    }

    /// Register a rate limit for a provider. Calls against an unregistered
    /// provider skip rate limiting.
    pub fn register_provider(&mut self, provider: &str, limit: RateLimitConfig) {
        self.limiters
            .insert(provider.to_string(), RateLimiter::new(limit));
    }

    /// The run-wide cost ledger.
    pub fn ledger(&self) -> &Arc<CostLedger> {
        &self.ledger
    }

    /// Run `call` under the provider's rate limit with retry on transient
    /// failures. On success, any reported usage is appended to the ledger.
    ///
    /// `operation` labels the ledger entry (a model id, an endpoint name).
    pub async fn execute<T, F, Fut>(
        &self,
        provider: &str,
        operation: &str,
        mut call: F,
    ) -> Result<T, ExecutorError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<CallOutcome<T>, ApiError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            if let Some(limiter) = self.limiters.get(provider) {
                limiter.acquire().await;
            }

            match call().await {
                Ok(outcome) => {
                    if let Some(usage) = outcome.usage {
                        self.ledger.record(provider, operation, usage);
                    }
                    debug!(provider, operation, attempt, "call succeeded");
                    return Ok(outcome.value);
                }
                Err(error) => match self.policy.decide(attempt, &error) {
                    RetryDecision::Retry { delay } => {
                        warn!(
                            provider,
                            operation,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %error,
                            "transient failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    RetryDecision::GiveUp => {
                        warn!(provider, operation, attempt, error = %error, "giving up");
                        return Err(if error.is_transient() {
                            ExecutorError::ExhaustedRetries {
                                attempts: attempt + 1,
                                last: error,
                            }
                        } else {
                            ExecutorError::Permanent(error)
                        });
                    }
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    fn executor() -> RequestExecutor {
        RequestExecutor::new(&RetryConfig {
            attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter: false,
        })
    }

    fn transient() -> ApiError {
        ApiError::Http {
            provider: "test".to_string(),
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt_with_growing_delays() {
        let exec = executor();
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = exec
            .execute("test", "op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(transient())
                    } else {
                        Ok(CallOutcome::unbilled(42u32))
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(result, 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Two backoff sleeps: 1000ms then 2000ms
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_carries_last_error() {
        let exec = executor();
        let calls = AtomicU32::new(0);

        let err = exec
            .execute("test", "op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<CallOutcome<()>, _>(transient()) }
            })
            .await
            .unwrap_err();

        // Initial call plus 3 retries
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        match err {
            ExecutorError::ExhaustedRetries { attempts, last } => {
                assert_eq!(attempts, 4);
                assert_eq!(last.status(), Some(503));
            }
            other => panic!("expected ExhaustedRetries, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_permanent_error_fails_without_retry() {
        let exec = executor();
        let calls = AtomicU32::new(0);

        let err = exec
            .execute("test", "op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<CallOutcome<()>, _>(ApiError::Http {
                        provider: "test".to_string(),
                        status: 404,
                        message: "not found".to_string(),
                    })
                }
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(err, ExecutorError::Permanent(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_call_records_usage() {
        let exec = executor();
        exec.execute("vision", "model-a", || async {
            Ok::<_, ApiError>(CallOutcome::billed((), 1200, 0.003))
        })
        .await
        .unwrap();

        let entries = exec.ledger().entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].provider, "vision");
        assert_eq!(entries[0].operation, "model-a");
        assert_eq!(entries[0].units, 1200);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_call_records_nothing() {
        let exec = executor();
        let _ = exec
            .execute("vision", "model-a", || async {
                Err::<CallOutcome<()>, _>(ApiError::InvalidResponse {
                    provider: "vision".to_string(),
                    message: "bad json".to_string(),
                })
            })
            .await;

        assert!(exec.ledger().entries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limited_provider_waits() {
        let mut exec = executor();
        exec.register_provider("search", RateLimitConfig { rate: 2, window_ms: 1000 });

        let start = Instant::now();
        for _ in 0..4 {
            exec.execute("search", "query", || async {
                Ok::<_, ApiError>(CallOutcome::unbilled(()))
            })
            .await
            .unwrap();
        }
        // 2 immediate, then the window must drain before 2 more
        assert!(start.elapsed() >= Duration::from_millis(1000));
    }
}
