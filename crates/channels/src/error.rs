//! Error taxonomy shared by every platform adapter.
//!
//! Mirrors the exception hierarchy each adapter's upstream API maps onto:
//! auth failures, rate limiting, missing resources, and bad requests are
//! distinct variants so callers (the sync engine, reservation flow) can
//! react differently to each.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelAdapterError {
    /// 401/403 — the stored access token is invalid or expired.
    #[error("authentication failed for {channel}: {message}")]
    Authentication { channel: String, message: String },

    /// 429 — carries the `Retry-After` value when the platform sent one.
    #[error("rate limited by {channel}, retry after {retry_after_secs:?}s")]
    RateLimited {
        channel: String,
        retry_after_secs: Option<u64>,
    },

    /// 404 — the remote property or booking does not exist.
    #[error("{channel} resource not found: {resource}")]
    NotFound { channel: String, resource: String },

    /// 400 — the platform rejected the request body.
    #[error("{channel} rejected request: {message}")]
    Validation { channel: String, message: String },

    /// 5xx or a transport-level failure; safe to retry.
    #[error("{channel} request failed: {message}")]
    Transient { channel: String, message: String },

    /// The response body didn't match what the adapter expected.
    #[error("returned an unparseable response: {0}")]
    MalformedResponse(String),

    #[error("webhook signature verification failed for {0}")]
    InvalidSignature(String),

    #[error("connector configuration error: {0}")]
    Configuration(String),
}

impl ChannelAdapterError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transient { .. })
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Self::RateLimited {
                retry_after_secs, ..
            } => *retry_after_secs,
            _ => None,
        }
    }
}
