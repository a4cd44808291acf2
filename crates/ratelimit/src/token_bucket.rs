//! Token-bucket limiter for bursty channels: a bucket of capacity `B`
//! refills at `N/W` tokens per second; `acquire(k)` consumes `k` tokens
//! atomically, computing elapsed refill before comparing.

use std::sync::LazyLock;

use chrono::Utc;
use redis::Script;

use crate::error::RateLimitError;
use crate::store::RateLimitStore;

static TOKEN_BUCKET_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        local key = KEYS[1]
        local now_ms = tonumber(ARGV[1])
        local capacity = tonumber(ARGV[2])
        local refill_per_ms = tonumber(ARGV[3])
        local cost = tonumber(ARGV[4])

        local bucket = redis.call('HMGET', key, 'tokens', 'updated_at')
        local tokens = tonumber(bucket[1])
        local updated_at = tonumber(bucket[2])

        if tokens == nil then
            tokens = capacity
            updated_at = now_ms
        end

        local elapsed = now_ms - updated_at
        if elapsed > 0 then
            tokens = math.min(capacity, tokens + elapsed * refill_per_ms)
            updated_at = now_ms
        end

        if tokens >= cost then
            tokens = tokens - cost
            redis.call('HMSET', key, 'tokens', tokens, 'updated_at', updated_at)
            redis.call('PEXPIRE', key, 60000)
            return {1, 0, math.floor(tokens)}
        else
            local deficit = cost - tokens
            local wait_ms = math.ceil(deficit / refill_per_ms)
            redis.call('HMSET', key, 'tokens', tokens, 'updated_at', updated_at)
            redis.call('PEXPIRE', key, 60000)
            return {0, wait_ms, math.floor(tokens)}
        end
        "#,
    )
});

pub struct TokenBucketLimiter {
    store: RateLimitStore,
}

impl TokenBucketLimiter {
    pub fn new(store: RateLimitStore) -> Self {
        Self { store }
    }

    fn key(channel_kind: &str, connection_id: &str) -> String {
        format!("ratelimit:tb:{channel_kind}:{connection_id}")
    }

    /// Returns the bucket's in-use quota (`capacity - tokens_remaining`) on
    /// success, for the current-count gauge; `Err` on rejection.
    pub async fn acquire(
        &self,
        channel_kind: &str,
        connection_id: &str,
        cost: u32,
        window_secs: u32,
        limit_per_window: u32,
        capacity: u32,
    ) -> Result<u32, RateLimitError> {
        let key = Self::key(channel_kind, connection_id);
        let now_ms = Utc::now().timestamp_millis();
        let refill_per_ms = limit_per_window as f64 / (window_secs as f64 * 1000.0);

        let mut conn = self.store.connection();
        let (ok, wait_ms, tokens_remaining): (i64, i64, u32) = TOKEN_BUCKET_SCRIPT
            .key(&key)
            .arg(now_ms)
            .arg(capacity)
            .arg(refill_per_ms)
            .arg(cost)
            .invoke_async(&mut conn)
            .await?;

        if ok == 1 {
            Ok(capacity.saturating_sub(tokens_remaining))
        } else {
            Err(RateLimitError::Exceeded {
                key,
                retry_after_ms: wait_ms.max(0) as u64,
            })
        }
    }
}
