//! Three-state circuit breaker resident in Redis. Reads are allowed to
//! lazily transition `OPEN -> HALF_OPEN`; there is no separate scheduler.

use std::sync::LazyLock;

use chrono::Utc;
use redis::{AsyncCommands, Script};
use serde::Serialize;

use crate::config::config_for;
use crate::error::CircuitError;
use crate::store::CircuitStore;

pub mod state {
    pub const CLOSED: &str = "CLOSED";
    pub const OPEN: &str = "OPEN";
    pub const HALF_OPEN: &str = "HALF_OPEN";
}

static ADMIT_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        local state_key = KEYS[1]
        local now_ms = tonumber(ARGV[1])
        local timeout_ms = tonumber(ARGV[2])
        local half_open_max = tonumber(ARGV[3])

        local current = redis.call('HGET', state_key, 'state') or 'CLOSED'

        if current == 'OPEN' then
            local opened_at = tonumber(redis.call('HGET', state_key, 'opened_at')) or now_ms
            if now_ms - opened_at >= timeout_ms then
                current = 'HALF_OPEN'
                redis.call('HMSET', state_key, 'state', 'HALF_OPEN', 'half_open_calls', 0, 'half_open_successes', 0)
            end
        end

        if current == 'CLOSED' then
            return {1, 'CLOSED', 0}
        elseif current == 'OPEN' then
            local opened_at = tonumber(redis.call('HGET', state_key, 'opened_at')) or now_ms
            local retry_after = timeout_ms - (now_ms - opened_at)
            if retry_after < 0 then retry_after = 0 end
            return {0, 'OPEN', retry_after}
        else
            local calls = tonumber(redis.call('HGET', state_key, 'half_open_calls')) or 0
            if calls < half_open_max then
                redis.call('HINCRBY', state_key, 'half_open_calls', 1)
                return {1, 'HALF_OPEN', 0}
            else
                return {0, 'HALF_OPEN', 0}
            end
        end
        "#,
    )
});

static RECORD_FAILURE_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        local state_key = KEYS[1]
        local failures_key = KEYS[2]
        local now_ms = tonumber(ARGV[1])
        local window_ms = tonumber(ARGV[2])
        local failure_threshold = tonumber(ARGV[3])
        local nonce = ARGV[4]

        local current = redis.call('HGET', state_key, 'state') or 'CLOSED'

        if current == 'HALF_OPEN' then
            redis.call('HMSET', state_key, 'state', 'OPEN', 'opened_at', now_ms, 'half_open_calls', 0, 'half_open_successes', 0)
            return {current, 'OPEN'}
        end
        if current == 'OPEN' then
            return {current, 'OPEN'}
        end

        redis.call('ZADD', failures_key, now_ms, nonce)
        redis.call('ZREMRANGEBYSCORE', failures_key, '-inf', now_ms - window_ms)
        redis.call('PEXPIRE', failures_key, window_ms * 2)
        local count = redis.call('ZCARD', failures_key)

        if count >= failure_threshold then
            redis.call('HMSET', state_key, 'state', 'OPEN', 'opened_at', now_ms, 'half_open_calls', 0, 'half_open_successes', 0)
            return {current, 'OPEN'}
        end
        return {current, 'CLOSED'}
        "#,
    )
});

static RECORD_SUCCESS_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        local state_key = KEYS[1]
        local success_threshold = tonumber(ARGV[1])

        local current = redis.call('HGET', state_key, 'state') or 'CLOSED'
        if current == 'HALF_OPEN' then
            local successes = redis.call('HINCRBY', state_key, 'half_open_successes', 1)
            if successes >= success_threshold then
                redis.call('DEL', state_key)
                return {current, 'CLOSED'}
            end
            return {current, 'HALF_OPEN'}
        end
        return {current, current}
        "#,
    )
});

#[derive(Debug, Clone, Serialize)]
pub struct CircuitStatus {
    pub channel_kind: String,
    pub state: String,
    /// Populated when `state == CLOSED`: failures currently in the window.
    pub failures_in_window: Option<u32>,
    /// Populated when `state == OPEN`: milliseconds until `HALF_OPEN`.
    pub open_elapsed_ms: Option<u64>,
    /// Populated when `state == HALF_OPEN`: remaining probe budget.
    pub half_open_calls_remaining: Option<u32>,
}

/// Numeric encoding for the `circuit_state` gauge, the shape spec'd for
/// dashboards that can't group by a string label series well: 0=CLOSED,
/// 1=OPEN, 2=HALF_OPEN.
fn state_value(state: &str) -> f64 {
    match state {
        state::OPEN => 1.0,
        state::HALF_OPEN => 2.0,
        _ => 0.0,
    }
}

fn record_transition(channel_kind: &str, from: &str, to: &str) {
    metrics::register_gauge!("circuit_state", "channel" => channel_kind.to_string()).set(state_value(to));
    if from != to {
        metrics::register_counter!(
            "circuit_transitions_total",
            "channel" => channel_kind.to_string(),
            "from" => from.to_string(),
            "to" => to.to_string(),
        )
        .increment(1);
    }
}

pub struct CircuitBreaker {
    store: CircuitStore,
}

impl CircuitBreaker {
    pub fn new(store: CircuitStore) -> Self {
        Self { store }
    }

    fn state_key(channel_kind: &str) -> String {
        format!("circuit:state:{channel_kind}")
    }

    fn failures_key(channel_kind: &str) -> String {
        format!("circuit:failures:{channel_kind}")
    }

    /// Admission check; the sole way a caller may proceed with a remote
    /// call against `channel_kind`.
    pub async fn admit(&self, channel_kind: &str) -> Result<(), CircuitError> {
        let cfg = config_for(channel_kind);
        let now_ms = Utc::now().timestamp_millis();
        let mut conn = self.store.connection();

        let (ok, observed_state, extra): (i64, String, i64) = ADMIT_SCRIPT
            .key(Self::state_key(channel_kind))
            .arg(now_ms)
            .arg(cfg.timeout_secs as i64 * 1000)
            .arg(cfg.half_open_max_calls)
            .invoke_async(&mut conn)
            .await?;

        metrics::register_gauge!("circuit_state", "channel" => channel_kind.to_string())
            .set(state_value(&observed_state));

        if ok == 1 {
            Ok(())
        } else if observed_state == state::OPEN {
            metrics::register_counter!("circuit_rejected_total", "channel" => channel_kind.to_string())
                .increment(1);
            Err(CircuitError::Open {
                channel: channel_kind.to_string(),
                retry_after_ms: extra.max(0) as u64,
            })
        } else {
            metrics::register_counter!("circuit_rejected_total", "channel" => channel_kind.to_string())
                .increment(1);
            Err(CircuitError::HalfOpenBudgetExhausted(channel_kind.to_string()))
        }
    }

    pub async fn record_failure(&self, channel_kind: &str) -> Result<(), CircuitError> {
        let cfg = config_for(channel_kind);
        let now_ms = Utc::now().timestamp_millis();
        let nonce = format!("{now_ms}-{}", std::process::id());
        let mut conn = self.store.connection();

        let (old_state, new_state): (String, String) = RECORD_FAILURE_SCRIPT
            .key(Self::state_key(channel_kind))
            .key(Self::failures_key(channel_kind))
            .arg(now_ms)
            .arg(cfg.window_secs as i64 * 1000)
            .arg(cfg.failure_threshold)
            .arg(nonce)
            .invoke_async(&mut conn)
            .await?;

        metrics::register_counter!("circuit_failures_total", "channel" => channel_kind.to_string()).increment(1);
        record_transition(channel_kind, &old_state, &new_state);
        if new_state == state::OPEN {
            tracing::warn!(channel = channel_kind, "circuit tripped to OPEN");
            metrics::register_counter!("circuit_tripped_total", "channel" => channel_kind.to_string())
                .increment(1);
        }
        Ok(())
    }

    pub async fn record_success(&self, channel_kind: &str) -> Result<(), CircuitError> {
        let cfg = config_for(channel_kind);
        let mut conn = self.store.connection();

        let (old_state, new_state): (String, String) = RECORD_SUCCESS_SCRIPT
            .key(Self::state_key(channel_kind))
            .arg(cfg.success_threshold)
            .invoke_async(&mut conn)
            .await?;

        metrics::register_counter!("circuit_successes_total", "channel" => channel_kind.to_string()).increment(1);
        record_transition(channel_kind, &old_state, &new_state);
        if new_state == state::CLOSED && old_state != state::CLOSED {
            tracing::info!(channel = channel_kind, "circuit closed");
        }
        Ok(())
    }

    pub async fn force_open(&self, channel_kind: &str) -> Result<(), CircuitError> {
        let now_ms = Utc::now().timestamp_millis();
        let mut conn = self.store.connection();
        let _: () = conn
            .hset_multiple(
                Self::state_key(channel_kind),
                &[
                    ("state", state::OPEN.to_string()),
                    ("opened_at", now_ms.to_string()),
                    ("half_open_calls", "0".to_string()),
                    ("half_open_successes", "0".to_string()),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn force_close(&self, channel_kind: &str) -> Result<(), CircuitError> {
        self.reset(channel_kind).await
    }

    pub async fn reset(&self, channel_kind: &str) -> Result<(), CircuitError> {
        let mut conn = self.store.connection();
        let _: () = conn.del(Self::state_key(channel_kind)).await?;
        let _: () = conn.del(Self::failures_key(channel_kind)).await?;
        Ok(())
    }

    pub async fn status(&self, channel_kind: &str) -> Result<CircuitStatus, CircuitError> {
        let cfg = config_for(channel_kind);
        let mut conn = self.store.connection();
        let current_state: Option<String> = conn.hget(Self::state_key(channel_kind), "state").await?;
        let current_state = current_state.unwrap_or_else(|| state::CLOSED.to_string());

        match current_state.as_str() {
            state::OPEN => {
                let opened_at: Option<i64> = conn
                    .hget(Self::state_key(channel_kind), "opened_at")
                    .await?;
                let opened_at = opened_at.unwrap_or(0);
                let now_ms = Utc::now().timestamp_millis();
                let elapsed = (now_ms - opened_at).max(0) as u64;
                Ok(CircuitStatus {
                    channel_kind: channel_kind.to_string(),
                    state: current_state,
                    failures_in_window: None,
                    open_elapsed_ms: Some(elapsed),
                    half_open_calls_remaining: None,
                })
            }
            state::HALF_OPEN => {
                let calls: Option<u32> = conn
                    .hget(Self::state_key(channel_kind), "half_open_calls")
                    .await?;
                let calls = calls.unwrap_or(0);
                Ok(CircuitStatus {
                    channel_kind: channel_kind.to_string(),
                    state: current_state,
                    failures_in_window: None,
                    open_elapsed_ms: None,
                    half_open_calls_remaining: Some(cfg.half_open_max_calls.saturating_sub(calls)),
                })
            }
            _ => {
                let count: u32 = conn.zcard(Self::failures_key(channel_kind)).await?;
                Ok(CircuitStatus {
                    channel_kind: channel_kind.to_string(),
                    state: state::CLOSED.to_string(),
                    failures_in_window: Some(count),
                    open_elapsed_ms: None,
                    half_open_calls_remaining: None,
                })
            }
        }
    }
}
