//! Facade combining the per-channel config table, the chosen algorithm, and
//! the adaptive multiplier into the `acquire`/`acquire_or_raise`/
//! `acquire_with_wait` operations callers actually use.

use std::time::Duration;

use tokio::time::sleep;

use crate::adaptive::AdaptiveState;
use crate::config::{self, Algorithm};
use crate::error::RateLimitError;
use crate::sliding_window::SlidingWindowLimiter;
use crate::store::RateLimitStore;
use crate::token_bucket::TokenBucketLimiter;

#[derive(Clone)]
pub struct RateLimiter {
    sliding_window: std::sync::Arc<SlidingWindowLimiter>,
    token_bucket: std::sync::Arc<TokenBucketLimiter>,
    adaptive: std::sync::Arc<AdaptiveState>,
}

impl RateLimiter {
    pub fn new(store: RateLimitStore) -> Self {
        Self {
            sliding_window: std::sync::Arc::new(SlidingWindowLimiter::new(store.clone())),
            token_bucket: std::sync::Arc::new(TokenBucketLimiter::new(store.clone())),
            adaptive: std::sync::Arc::new(AdaptiveState::new(store)),
        }
    }

    /// Attempts to acquire `weight` operations for `(channel_kind,
    /// connection_id)`. Honors a standing remote-rejection block before
    /// touching the underlying algorithm.
    pub async fn acquire(
        &self,
        channel_kind: &str,
        connection_id: &str,
        weight: u32,
    ) -> Result<(), RateLimitError> {
        if let Some(retry_after_ms) = self.adaptive.blocked_until(channel_kind, connection_id).await? {
            metrics::register_counter!("ratelimit_blocked_total", "channel" => channel_kind.to_string())
                .increment(1);
            return Err(RateLimitError::Exceeded {
                key: format!("{channel_kind}:{connection_id}"),
                retry_after_ms,
            });
        }

        let cfg = config::limit_for(channel_kind);
        let factor = self.adaptive.factor(channel_kind, connection_id).await?;
        let effective_limit = ((cfg.effective_limit() as f64) * factor).round().max(1.0) as u32;

        let result = match cfg.algorithm {
            Algorithm::SlidingWindow => {
                self.sliding_window
                    .acquire(channel_kind, connection_id, weight, cfg.window_secs, effective_limit)
                    .await
            }
            Algorithm::TokenBucket => {
                self.token_bucket
                    .acquire(
                        channel_kind,
                        connection_id,
                        weight,
                        cfg.window_secs,
                        cfg.limit,
                        effective_limit,
                    )
                    .await
            }
        };

        match result {
            Ok(count) => {
                self.adaptive.record_success(channel_kind, connection_id).await?;
                metrics::register_counter!("ratelimit_acquired_total", "channel" => channel_kind.to_string())
                    .increment(1);
                metrics::register_gauge!("ratelimit_current_count", "channel" => channel_kind.to_string())
                    .set(count as f64);
                Ok(())
            }
            Err(e) => {
                metrics::register_counter!("ratelimit_rejected_total", "channel" => channel_kind.to_string())
                    .increment(1);
                Err(e)
            }
        }
    }

    /// Same as `acquire`, named to match the operation the sync engine's
    /// task wrapper calls — it surfaces the typed `Exceeded` error with
    /// `retry_after` rather than a bare bool.
    pub async fn acquire_or_raise(
        &self,
        channel_kind: &str,
        connection_id: &str,
        weight: u32,
    ) -> Result<(), RateLimitError> {
        self.acquire(channel_kind, connection_id, weight).await
    }

    /// Loops on rejection, sleeping `min(retry_after, remaining_budget,
    /// 1s)` between attempts. Records total time spent waiting.
    pub async fn acquire_with_wait(
        &self,
        channel_kind: &str,
        connection_id: &str,
        weight: u32,
        max_wait: Duration,
    ) -> Result<(), RateLimitError> {
        let deadline = tokio::time::Instant::now() + max_wait;
        let mut total_waited = Duration::ZERO;

        loop {
            match self.acquire(channel_kind, connection_id, weight).await {
                Ok(()) => {
                    metrics::register_histogram!("ratelimit_wait_seconds", "channel" => channel_kind.to_string())
                        .record(total_waited.as_secs_f64());
                    return Ok(());
                }
                Err(RateLimitError::Exceeded { retry_after_ms, .. }) => {
                    let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
                    if remaining.is_zero() {
                        return Err(RateLimitError::WaitBudgetExhausted(format!(
                            "{channel_kind}:{connection_id}"
                        )));
                    }
                    let step = Duration::from_millis(retry_after_ms)
                        .min(remaining)
                        .min(Duration::from_secs(1));
                    sleep(step).await;
                    total_waited += step;
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Called by adapter error-handling when the remote API itself returned
    /// 429; narrows the adaptive factor and honors `Retry-After`.
    pub async fn record_remote_rate_limit(
        &self,
        channel_kind: &str,
        connection_id: &str,
        retry_after: Option<Duration>,
    ) -> Result<(), RateLimitError> {
        self.adaptive
            .record_remote_rejection(channel_kind, connection_id, retry_after)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_step_never_exceeds_one_second() {
        let retry_after = Duration::from_millis(5000);
        let remaining = Duration::from_secs(10);
        let step = retry_after.min(remaining).min(Duration::from_secs(1));
        assert_eq!(step, Duration::from_secs(1));
    }
}
