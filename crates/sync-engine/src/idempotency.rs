//! Idempotency key derivation and the coordination-store "seen" set that
//! backs duplicate-import and duplicate-webhook short-circuiting.

use redis::AsyncCommands;
use sha2::{Digest, Sha256};

use crate::error::SyncError;

const SEEN_KEY_PREFIX: &str = "idem:seen:";
pub const SEEN_TTL_SECS: usize = 24 * 60 * 60;

/// `sha256(parts.join(""))[:32]` hex-encoded, truncated to the first 32
/// hex characters (16 bytes of digest) — matches every key derivation named
/// across outbound import, polling, and webhook ingress.
pub fn derive_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
    }
    let digest = hasher.finalize();
    hex::encode(digest)[..32].to_string()
}

#[derive(Clone)]
pub struct SeenStore {
    conn: redis::aio::ConnectionManager,
}

impl SeenStore {
    pub fn new(conn: redis::aio::ConnectionManager) -> Self {
        Self { conn }
    }

    /// Atomically marks `key` seen; returns `true` if this call was the
    /// first to see it (the caller should proceed), `false` if it was
    /// already present (the caller should short-circuit as a duplicate).
    pub async fn mark_if_unseen(&self, key: &str) -> Result<bool, SyncError> {
        let mut conn = self.conn.clone();
        let full_key = format!("{SEEN_KEY_PREFIX}{key}");
        let set: bool = redis::cmd("SET")
            .arg(&full_key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(SEEN_TTL_SECS)
            .query_async::<_, Option<String>>(&mut conn)
            .await?
            .is_some();
        Ok(set)
    }

    pub async fn is_seen(&self, key: &str) -> Result<bool, SyncError> {
        let mut conn = self.conn.clone();
        let full_key = format!("{SEEN_KEY_PREFIX}{key}");
        Ok(conn.exists(&full_key).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_key_is_deterministic() {
        let a = derive_key(&["airbnb", "res-1", "2026-08-01T00:00:00Z"]);
        let b = derive_key(&["airbnb", "res-1", "2026-08-01T00:00:00Z"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn derive_key_differs_on_input_change() {
        let a = derive_key(&["airbnb", "res-1"]);
        let b = derive_key(&["airbnb", "res-2"]);
        assert_ne!(a, b);
    }
}
