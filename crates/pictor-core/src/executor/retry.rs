//! Retry policy: error classification plus exponential backoff.
//!
//! The policy is a pure decision function over (attempt, error) so it can be
//! tested without real time; the executor owns the actual sleeping.

use crate::config::RetryConfig;
use crate::error::ApiError;
use std::time::Duration;

/// What to do after a failed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    /// Wait `delay`, then make another attempt.
    Retry { delay: Duration },
    /// Stop: either the error is permanent or attempts are exhausted.
    GiveUp,
}

/// Bounded exponential backoff with an optional jitter fraction.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    jitter: bool,
}

impl RetryPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }

    /// Max retry attempts after the initial call.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Decide whether the attempt that just failed should be retried.
    ///
    /// `failed_attempt` is zero-based: 0 means the initial call failed.
    pub fn decide(&self, failed_attempt: u32, error: &ApiError) -> RetryDecision {
        if !error.is_transient() || failed_attempt >= self.max_retries {
            return RetryDecision::GiveUp;
        }
        RetryDecision::Retry {
            delay: self.backoff_delay(failed_attempt),
        }
    }

    /// Backoff for a given attempt: `base * 2^attempt`, capped.
    ///
    /// Jitter adds up to 25% of the delay, so delays stay monotonically
    /// non-decreasing across attempts (2x growth dominates 1.25x jitter).
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let delay_ms = base_ms
            .saturating_mul(2u64.saturating_pow(attempt))
            .min(self.max_delay.as_millis() as u64);

        if self.jitter {
            let jitter_ms = (delay_ms as f64 * 0.25 * rand::random::<f64>()) as u64;
            Duration::from_millis(delay_ms + jitter_ms)
        } else {
            Duration::from_millis(delay_ms)
        }
    }
}
