//! Thin wrapper around the shared coordination-store connection.

use redis::aio::ConnectionManager;
use redis::Client;

use crate::error::RateLimitError;

pub const REDIS_URL_ENV: &str = "REDIS_URL";
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

#[derive(Clone)]
pub struct RateLimitStore {
    conn: ConnectionManager,
}

impl RateLimitStore {
    pub async fn new(url: &str) -> Result<Self, RateLimitError> {
        let client = Client::open(url)
            .map_err(|e| RateLimitError::Connection(format!("invalid redis url: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| RateLimitError::Connection(e.to_string()))?;
        Ok(Self { conn })
    }

    pub async fn from_env() -> Result<Self, RateLimitError> {
        let url = std::env::var(REDIS_URL_ENV).unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string());
        Self::new(&url).await
    }

    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}
