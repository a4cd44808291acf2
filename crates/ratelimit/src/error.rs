use thiserror::Error;

/// Errors surfaced by the rate limiter crate.
#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Redis connection error: {0}")]
    Connection(String),

    #[error("Redis operation error: {0}")]
    Operation(String),

    /// Local quota denied the call. Carries the time the caller should wait
    /// before retrying, derived from the oldest timestamp in the window.
    #[error("rate limit exceeded for {key}, retry after {retry_after_ms}ms")]
    Exceeded { key: String, retry_after_ms: u64 },

    /// `acquire_with_wait` exhausted its budget without acquiring.
    #[error("rate limit wait budget exhausted for {0}")]
    WaitBudgetExhausted(String),
}

impl From<redis::RedisError> for RateLimitError {
    fn from(err: redis::RedisError) -> Self {
        RateLimitError::Operation(err.to_string())
    }
}

impl RateLimitError {
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            RateLimitError::Exceeded { retry_after_ms, .. } => Some(*retry_after_ms),
            _ => None,
        }
    }
}
