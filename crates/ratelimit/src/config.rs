//! Immutable, per-channel rate limit configuration.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Algorithm backing a channel's limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    SlidingWindow,
    TokenBucket,
}

#[derive(Debug, Clone, Copy)]
pub struct ChannelLimit {
    pub algorithm: Algorithm,
    /// Operations allowed per `window_secs`.
    pub limit: u32,
    pub window_secs: u32,
    /// Burst ceiling, `>= limit`. Defaults to `limit` when absent.
    pub burst: Option<u32>,
}

impl ChannelLimit {
    pub fn effective_limit(&self) -> u32 {
        self.burst.unwrap_or(self.limit)
    }
}

/// Default per-channel quotas, matching the table every adapter is onboarded
/// against. Operators may override these via `ChannelManagerConfig`; this
/// table is the fallback used when no override is configured.
pub static DEFAULT_LIMITS: LazyLock<HashMap<&'static str, ChannelLimit>> = LazyLock::new(|| {
    let mut m = HashMap::new();
    m.insert(
        "airbnb",
        ChannelLimit {
            algorithm: Algorithm::SlidingWindow,
            limit: 10,
            window_secs: 1,
            burst: Some(15),
        },
    );
    m.insert(
        "booking_com",
        ChannelLimit {
            algorithm: Algorithm::SlidingWindow,
            limit: 20,
            window_secs: 60,
            burst: Some(30),
        },
    );
    m.insert(
        "expedia",
        ChannelLimit {
            algorithm: Algorithm::TokenBucket,
            limit: 50,
            window_secs: 1,
            burst: Some(75),
        },
    );
    m.insert(
        "fewo_direkt",
        ChannelLimit {
            algorithm: Algorithm::SlidingWindow,
            limit: 30,
            window_secs: 1,
            burst: Some(45),
        },
    );
    m.insert(
        "google",
        ChannelLimit {
            algorithm: Algorithm::TokenBucket,
            limit: 100,
            window_secs: 1,
            burst: Some(150),
        },
    );
    m
});

pub fn limit_for(channel_kind: &str) -> ChannelLimit {
    *DEFAULT_LIMITS
        .get(channel_kind)
        .unwrap_or_else(|| panic!("no rate limit configured for channel kind {channel_kind}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn airbnb_burst_exceeds_limit() {
        let c = limit_for("airbnb");
        assert_eq!(c.effective_limit(), 15);
        assert_eq!(c.limit, 10);
    }

    #[test]
    fn google_uses_token_bucket() {
        assert_eq!(limit_for("google").algorithm, Algorithm::TokenBucket);
    }
}
