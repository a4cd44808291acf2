//! Distributed lock used to serialize a calendar hold against concurrent
//! bookings for the same unit and date range.
//!
//! Acquisition is a single `SET key value NX PX ttl`; release is a Lua
//! script so a lock never deletes a key it no longer owns (the classic
//! SETNX/DEL race when a holder's TTL has already expired and a second
//! caller has since acquired it).

use std::sync::LazyLock;

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use thiserror::Error;
use uuid::Uuid;

pub const REDIS_URL_ENV: &str = "REDIS_URL";
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Default hold time for a lock token before it is considered abandoned.
pub const DEFAULT_LOCK_TTL_MS: usize = 10_000;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("redis connection error: {0}")]
    Connection(String),

    #[error("redis operation error: {0}")]
    Operation(String),

    #[error("lock already held for {0}")]
    Contended(String),
}

impl From<redis::RedisError> for LockError {
    fn from(err: redis::RedisError) -> Self {
        LockError::Operation(err.to_string())
    }
}

static RELEASE_SCRIPT: LazyLock<Script> = LazyLock::new(|| {
    Script::new(
        r#"
        if redis.call('GET', KEYS[1]) == ARGV[1] then
            return redis.call('DEL', KEYS[1])
        else
            return 0
        end
        "#,
    )
});

#[derive(Clone)]
pub struct LockStore {
    conn: ConnectionManager,
}

impl LockStore {
    pub async fn new(url: &str) -> Result<Self, LockError> {
        let client = Client::open(url).map_err(|e| LockError::Connection(format!("invalid redis url: {e}")))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| LockError::Connection(e.to_string()))?;
        Ok(Self { conn })
    }

    pub async fn from_env() -> Result<Self, LockError> {
        let url = std::env::var(REDIS_URL_ENV).unwrap_or_else(|_| DEFAULT_REDIS_URL.to_string());
        Self::new(&url).await
    }

    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

/// A held calendar-hold lock. Dropping this without calling [`release`] is
/// safe — the TTL still bounds how long a crashed holder can block others —
/// but `release` should be called on the happy path so the next booking
/// attempt doesn't wait out the TTL unnecessarily.
///
/// [`release`]: DistributedLock::release
pub struct LockHandle {
    key: String,
    token: String,
}

pub struct DistributedLock {
    store: LockStore,
}

impl DistributedLock {
    pub fn new(store: LockStore) -> Self {
        Self { store }
    }

    fn key(resource: &str) -> String {
        format!("lock:{resource}")
    }

    /// Attempts to acquire the lock for `resource` once, returning
    /// immediately either way.
    pub async fn try_acquire(&self, resource: &str, ttl_ms: usize) -> Result<LockHandle, LockError> {
        let key = Self::key(resource);
        let token = Uuid::new_v4().to_string();
        let mut conn = self.store.connection();

        let acquired: bool = redis::cmd("SET")
            .arg(&key)
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async::<_, Option<String>>(&mut conn)
            .await?
            .is_some();

        if acquired {
            Ok(LockHandle { key, token })
        } else {
            Err(LockError::Contended(resource.to_string()))
        }
    }

    /// Polls [`try_acquire`](Self::try_acquire) until it succeeds or
    /// `max_wait_ms` elapses, sleeping `retry_interval_ms` between attempts.
    pub async fn acquire(
        &self,
        resource: &str,
        ttl_ms: usize,
        max_wait_ms: u64,
        retry_interval_ms: u64,
    ) -> Result<LockHandle, LockError> {
        let deadline = tokio::time::Instant::now() + tokio::time::Duration::from_millis(max_wait_ms);
        loop {
            match self.try_acquire(resource, ttl_ms).await {
                Ok(handle) => return Ok(handle),
                Err(LockError::Contended(_)) if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(tokio::time::Duration::from_millis(retry_interval_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Releases `handle` if it still owns the lock. A no-op (not an error)
    /// if the TTL already expired and someone else has since acquired it.
    pub async fn release(&self, handle: LockHandle) -> Result<(), LockError> {
        let mut conn = self.store.connection();
        let _: i64 = RELEASE_SCRIPT
            .key(&handle.key)
            .arg(&handle.token)
            .invoke_async(&mut conn)
            .await?;
        Ok(())
    }

    /// Extends the TTL on a held lock, for a long-running critical section
    /// that outlives the original grant.
    pub async fn extend(&self, handle: &LockHandle, ttl_ms: usize) -> Result<bool, LockError> {
        let mut conn = self.store.connection();
        let current: Option<String> = conn.get(&handle.key).await?;
        if current.as_deref() != Some(handle.token.as_str()) {
            return Ok(false);
        }
        let _: () = conn.pexpire(&handle.key, ttl_ms as i64).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_key_is_namespaced() {
        assert_eq!(DistributedLock::key("unit:42:2026-08-01"), "lock:unit:42:2026-08-01");
    }

    #[test]
    fn handles_carry_distinct_tokens() {
        let a = LockHandle {
            key: "lock:x".to_string(),
            token: Uuid::new_v4().to_string(),
        };
        let b = LockHandle {
            key: "lock:x".to_string(),
            token: Uuid::new_v4().to_string(),
        };
        assert_ne!(a.token, b.token);
    }
}
