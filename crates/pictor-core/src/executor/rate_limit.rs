//! Per-provider sliding-window rate limiting.
//!
//! The limiter keeps a log of completion timestamps and admits a call only
//! when fewer than `rate` calls completed in the trailing window, so no
//! window of the configured duration ever sees more than `rate` calls.
//! A caller that finds the window full suspends cooperatively until the
//! oldest entry ages out; calls never fail due to rate limiting. Timestamps
//! come from `tokio::time::Instant`, a monotonic clock, so wall-clock
//! adjustments cannot corrupt the log.

use crate::config::RateLimitConfig;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// Sliding window: at most `limit` acquisitions per trailing window.
pub struct RateLimiter {
    limit: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Create a limiter allowing `rate` calls per `window_ms`.
    pub fn new(config: RateLimitConfig) -> Self {
        let limit = (config.rate as usize).max(1);
        Self {
            limit,
            window: Duration::from_millis(config.window_ms),
            calls: Mutex::new(VecDeque::with_capacity(limit)),
        }
    }

    /// Claim a slot, suspending until the trailing window has room.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut calls = self.calls.lock().await;
                let now = Instant::now();
                while calls
                    .front()
                    .is_some_and(|&t| now.duration_since(t) >= self.window)
                {
                    calls.pop_front();
                }

                if calls.len() < self.limit {
                    calls.push_back(now);
                    return;
                }
                // Full window; room opens when the oldest entry ages out
                let oldest = calls[0];
                self.window - now.duration_since(oldest)
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Calls recorded in the trailing window (for diagnostics and tests).
    pub async fn in_window(&self) -> usize {
        let mut calls = self.calls.lock().await;
        let now = Instant::now();
        while calls
            .front()
            .is_some_and(|&t| now.duration_since(t) >= self.window)
        {
            calls.pop_front();
        }
        calls.len()
    }
}
