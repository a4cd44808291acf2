use thiserror::Error;

#[derive(Debug, Error)]
pub enum CircuitError {
    #[error("Redis connection error: {0}")]
    Connection(String),

    #[error("Redis operation error: {0}")]
    Operation(String),

    /// Breaker is open for this channel; carries the time until it will
    /// lazily move to `HALF_OPEN`.
    #[error("circuit open for {channel}, retry after {retry_after_ms}ms")]
    Open { channel: String, retry_after_ms: u64 },

    /// Breaker is half-open and has already admitted `half_open_max_calls`
    /// concurrent probes.
    #[error("circuit half-open probe budget exhausted for {0}")]
    HalfOpenBudgetExhausted(String),
}

impl From<redis::RedisError> for CircuitError {
    fn from(err: redis::RedisError) -> Self {
        CircuitError::Operation(err.to_string())
    }
}
