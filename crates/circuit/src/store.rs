use redis::aio::ConnectionManager;
use redis::Client;

use crate::error::CircuitError;

pub const REDIS_URL_ENV: &str = "REDIS_URL";
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

#[derive(Clone)]
pub struct CircuitStore {
    conn: ConnectionManager,
}

impl CircuitStore {
    pub async fn new(url: &str) -> Result<Self, CircuitError> {
        let client =
            Client::open(url).map_err(|e| CircuitError::Connection(format!("invalid redis url: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| CircuitError::Connection(e.to_string()))?;
        Ok(Self { conn })
    }

    pub async fn from_env() -> Result<Self, CircuitError> {
        let url = std::env::var(REDIS_URL_ENV).unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string());
        Self::new(&url).await
    }

    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}
