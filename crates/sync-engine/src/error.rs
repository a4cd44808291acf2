//! Sync engine error taxonomy, converging every collaborator's error type
//! into one enum tasks can match on to decide retry/skip/fail.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Adapter(#[from] channels::ChannelAdapterError),

    #[error(transparent)]
    RateLimit(#[from] ratelimit::RateLimitError),

    #[error("circuit open for {0}")]
    CircuitOpen(String),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("connection {0} not found")]
    ConnectionNotFound(uuid::Uuid),

    #[error("retries exhausted after {0} attempts: {1}")]
    RetriesExhausted(u32, String),

    #[error("malformed event payload: {0}")]
    MalformedEvent(String),
}

impl From<circuit::CircuitError> for SyncError {
    fn from(err: circuit::CircuitError) -> Self {
        match err {
            circuit::CircuitError::Open { channel, .. } => SyncError::CircuitOpen(channel),
            other => SyncError::CircuitOpen(other.to_string()),
        }
    }
}

impl SyncError {
    /// True if the outer task loop should retry with backoff rather than
    /// closing the SyncLog as a terminal failure.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Adapter(e) => e.is_retryable(),
            SyncError::RateLimit(_) => true,
            SyncError::Database(_) | SyncError::Redis(_) => true,
            SyncError::CircuitOpen(_) => false,
            SyncError::ConnectionNotFound(_) => false,
            SyncError::RetriesExhausted(..) => false,
            SyncError::MalformedEvent(_) => false,
        }
    }
}
