//! Sliding-window limiter: at most `effective_limit` operations in the last
//! `window_secs` seconds, enforced atomically in Redis via a Lua script so
//! the discard/count/append sequence is race-free across processes.

use std::sync::LazyLock;

use chrono::Utc;
use redis::Script;

use crate::error::RateLimitError;
use crate::store::RateLimitStore;

/// Discards expired timestamps, counts what remains, and — if the weighted
/// count still fits under the limit — appends `weight` fresh entries, all in
/// one round trip. Returns `{1, 0, count}` on success or `{0, retry_after_ms,
/// count}` on rejection; `count` is the occupancy right after the call, for
/// the current-count gauge.
static SLIDING_WINDOW_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        local key = KEYS[1]
        local now_ms = tonumber(ARGV[1])
        local window_ms = tonumber(ARGV[2])
        local weight = tonumber(ARGV[3])
        local limit = tonumber(ARGV[4])
        local nonce = ARGV[5]

        redis.call('ZREMRANGEBYSCORE', key, '-inf', now_ms - window_ms)
        local count = redis.call('ZCARD', key)

        if count + weight <= limit then
            for i = 1, weight do
                redis.call('ZADD', key, now_ms, nonce .. ':' .. i)
            end
            redis.call('PEXPIRE', key, window_ms * 2)
            return {1, 0, count + weight}
        else
            local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
            local oldest_ts = now_ms
            if oldest[2] ~= nil then
                oldest_ts = tonumber(oldest[2])
            end
            local retry_after = (oldest_ts + window_ms) - now_ms
            if retry_after < 0 then retry_after = 0 end
            return {0, retry_after, count}
        end
        "#,
    )
});

pub struct SlidingWindowLimiter {
    store: RateLimitStore,
}

impl SlidingWindowLimiter {
    pub fn new(store: RateLimitStore) -> Self {
        Self { store }
    }

    fn key(channel_kind: &str, connection_id: &str) -> String {
        format!("ratelimit:sw:{channel_kind}:{connection_id}")
    }

    /// Attempts to acquire `weight` units. Returns the post-acquire window
    /// occupancy on success, or `Err(RateLimitError::Exceeded {
    /// retry_after_ms, .. })` on rejection.
    pub async fn acquire(
        &self,
        channel_kind: &str,
        connection_id: &str,
        weight: u32,
        window_secs: u32,
        effective_limit: u32,
    ) -> Result<u32, RateLimitError> {
        let key = Self::key(channel_kind, connection_id);
        let now_ms = Utc::now().timestamp_millis();
        let window_ms = window_secs as i64 * 1000;
        let nonce = uuid_nonce();

        let mut conn = self.store.connection();
        let (ok, retry_after_ms, count): (i64, i64, u32) = SLIDING_WINDOW_SCRIPT
            .key(&key)
            .arg(now_ms)
            .arg(window_ms)
            .arg(weight)
            .arg(effective_limit)
            .arg(&nonce)
            .invoke_async(&mut conn)
            .await?;

        if ok == 1 {
            Ok(count)
        } else {
            Err(RateLimitError::Exceeded {
                key,
                retry_after_ms: retry_after_ms.max(0) as u64,
            })
        }
    }
}

fn uuid_nonce() -> String {
    // Redis-local uniqueness only; doesn't need to be a real UUID.
    let pid = std::process::id();
    let t = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{pid}-{t}")
}
