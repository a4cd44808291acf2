//! Per-channel circuit breaker configuration.

use std::collections::HashMap;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy)]
pub struct CircuitConfig {
    /// Failures within the window before tripping to `OPEN`.
    pub failure_threshold: u32,
    /// Consecutive half-open successes before closing.
    pub success_threshold: u32,
    /// How long the breaker stays `OPEN` before probing again.
    pub timeout_secs: u32,
    /// Concurrent probes admitted while `HALF_OPEN`.
    pub half_open_max_calls: u32,
    /// Failure-counting window.
    pub window_secs: u32,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            timeout_secs: 60,
            half_open_max_calls: 2,
            window_secs: 120,
        }
    }
}

/// Per-channel overrides of the default breaker config; channels not listed
/// use `CircuitConfig::default()`.
pub static CHANNEL_OVERRIDES: LazyLock<HashMap<&'static str, CircuitConfig>> =
    LazyLock::new(|| {
        let mut m = HashMap::new();
        // Booking.com's XML endpoint is slower and flakier in practice; give
        // it a longer cooldown before the first half-open probe.
        m.insert(
            "booking_com",
            CircuitConfig {
                failure_threshold: 5,
                success_threshold: 2,
                timeout_secs: 120,
                half_open_max_calls: 2,
                window_secs: 60,
            },
        );
        m
    });

pub fn config_for(channel_kind: &str) -> CircuitConfig {
    CHANNEL_OVERRIDES
        .get(channel_kind)
        .copied()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlisted_channel_gets_defaults() {
        let cfg = config_for("airbnb");
        assert_eq!(cfg.failure_threshold, 5);
    }

    #[test]
    fn booking_com_has_a_longer_cooldown() {
        let cfg = config_for("booking_com");
        assert!(cfg.timeout_secs > CircuitConfig::default().timeout_secs);
    }
}
