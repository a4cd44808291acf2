//! Adaptive multiplier applied on top of a sliding-window or token-bucket
//! limiter: widens the effective limit on sustained success, narrows it on
//! observed remote rate-limiting, and honors `Retry-After` hints.

use std::sync::LazyLock;

use chrono::Utc;
use redis::Script;

use crate::error::RateLimitError;
use crate::store::RateLimitStore;

const MIN_FACTOR: f64 = 0.5;
const MAX_FACTOR: f64 = 1.5;
const GROWTH_STEP: f64 = 1.1;
const SHRINK_STEP: f64 = 0.75;
const SUCCESS_STREAK_FOR_GROWTH: i64 = 100;

/// Records a success; every 100th consecutive success grows the factor by
/// 10%, capped at 1.5.
static RECORD_SUCCESS_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        local key = KEYS[1]
        local growth_step = tonumber(ARGV[1])
        local max_factor = tonumber(ARGV[2])
        local streak_threshold = tonumber(ARGV[3])

        local state = redis.call('HMGET', key, 'factor', 'streak')
        local factor = tonumber(state[1]) or 1.0
        local streak = tonumber(state[2]) or 0

        streak = streak + 1
        if streak >= streak_threshold then
            factor = math.min(max_factor, factor * growth_step)
            streak = 0
        end

        redis.call('HMSET', key, 'factor', factor, 'streak', streak)
        redis.call('PEXPIRE', key, 86400000)
        return tostring(factor)
        "#,
    )
});

/// Records a remote rate-limit rejection: shrinks the factor by 25%,
/// floored at 0.5, resets the success streak, and sets a hard block until
/// `now + retry_after_ms` if one is supplied.
static RECORD_REJECTION_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        local key = KEYS[1]
        local shrink_step = tonumber(ARGV[1])
        local min_factor = tonumber(ARGV[2])
        local blocked_until = tonumber(ARGV[3])

        local state = redis.call('HMGET', key, 'factor')
        local factor = tonumber(state[1]) or 1.0
        factor = math.max(min_factor, factor * shrink_step)

        redis.call('HMSET', key, 'factor', factor, 'streak', 0, 'blocked_until', blocked_until)
        redis.call('PEXPIRE', key, 86400000)
        return tostring(factor)
        "#,
    )
});

pub struct AdaptiveState {
    store: RateLimitStore,
}

impl AdaptiveState {
    pub fn new(store: RateLimitStore) -> Self {
        Self { store }
    }

    fn key(channel_kind: &str, connection_id: &str) -> String {
        format!("ratelimit:adaptive:{channel_kind}:{connection_id}")
    }

    pub async fn factor(&self, channel_kind: &str, connection_id: &str) -> Result<f64, RateLimitError> {
        use redis::AsyncCommands;
        let mut conn = self.store.connection();
        let value: Option<String> = conn.hget(Self::key(channel_kind, connection_id), "factor").await?;
        Ok(value.and_then(|v| v.parse().ok()).unwrap_or(1.0))
    }

    /// Returns `Some(retry_after_ms)` if a remote-rejection block is still
    /// in effect.
    pub async fn blocked_until(
        &self,
        channel_kind: &str,
        connection_id: &str,
    ) -> Result<Option<u64>, RateLimitError> {
        use redis::AsyncCommands;
        let mut conn = self.store.connection();
        let value: Option<String> = conn
            .hget(Self::key(channel_kind, connection_id), "blocked_until")
            .await?;
        let Some(until_ms) = value.and_then(|v| v.parse::<i64>().ok()) else {
            return Ok(None);
        };
        let now_ms = Utc::now().timestamp_millis();
        if until_ms > now_ms {
            Ok(Some((until_ms - now_ms) as u64))
        } else {
            Ok(None)
        }
    }

    pub async fn record_success(
        &self,
        channel_kind: &str,
        connection_id: &str,
    ) -> Result<f64, RateLimitError> {
        let key = Self::key(channel_kind, connection_id);
        let mut conn = self.store.connection();
        let factor: String = RECORD_SUCCESS_SCRIPT
            .key(&key)
            .arg(GROWTH_STEP)
            .arg(MAX_FACTOR)
            .arg(SUCCESS_STREAK_FOR_GROWTH)
            .invoke_async(&mut conn)
            .await?;
        Ok(factor.parse().unwrap_or(1.0))
    }

    /// `retry_after` is the vendor's `Retry-After` hint, if any.
    pub async fn record_remote_rejection(
        &self,
        channel_kind: &str,
        connection_id: &str,
        retry_after: Option<std::time::Duration>,
    ) -> Result<f64, RateLimitError> {
        let key = Self::key(channel_kind, connection_id);
        let blocked_until = retry_after
            .map(|d| Utc::now().timestamp_millis() + d.as_millis() as i64)
            .unwrap_or(0);

        let mut conn = self.store.connection();
        let factor: String = RECORD_REJECTION_SCRIPT
            .key(&key)
            .arg(SHRINK_STEP)
            .arg(MIN_FACTOR)
            .arg(blocked_until)
            .invoke_async(&mut conn)
            .await?;
        Ok(factor.parse().unwrap_or(MIN_FACTOR))
    }
}

#[cfg(test)]
mod tests {
    use super::MAX_FACTOR as MAXF;
    use super::MIN_FACTOR as MINF;

    #[test]
    fn bounds_are_sane() {
        assert!(MINF < 1.0);
        assert!(MAXF > 1.0);
    }
}
