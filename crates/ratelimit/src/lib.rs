//! Per-channel rate limiting: sliding window, token bucket, and an adaptive
//! multiplier wrapper, all coordinated through Redis so the guarantee holds
//! across process boundaries.

pub mod adaptive;
pub mod config;
pub mod error;
pub mod limiter;
pub mod sliding_window;
pub mod store;
pub mod token_bucket;

pub use config::{Algorithm, ChannelLimit};
pub use error::RateLimitError;
pub use limiter::RateLimiter;
pub use store::RateLimitStore;
