//! Expiring key/value store
//!
//! 令牌黑名单、吊销水位线和限流计数器的短时存储。
//! 每个 key 的 TTL 都由调用方显式计算，不依赖全局过期时间。
//!
//! The store sits behind a trait so tests can inject a failing backend and
//! assert the fail-open behavior of its consumers.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::Duration;
use thiserror::Error;

use shared::util::now_millis;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Expiring key/value store used for token revocation and rate limiting.
#[async_trait]
pub trait TtlStore: Send + Sync {
    /// Insert or replace a key with an explicit time-to-live.
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    /// Fetch a key; expired keys read as absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Increment a counter. The TTL is applied when the key is first
    /// created (sliding window start), not refreshed on later increments.
    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, StoreError>;

    /// Remove a key.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;
}

struct Entry {
    value: String,
    expires_at: i64,
}

impl Entry {
    fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// In-process implementation backed by a concurrent map.
///
/// Expired entries are dropped lazily on read and in bulk by the periodic
/// [`MemoryTtlStore::cleanup`] pass.
pub struct MemoryTtlStore {
    inner: DashMap<String, Entry>,
}

impl MemoryTtlStore {
    pub fn new() -> Self {
        Self {
            inner: DashMap::new(),
        }
    }

    /// Drop expired entries; returns how many were removed.
    pub fn cleanup(&self) -> usize {
        let now = now_millis();
        let before = self.inner.len();
        self.inner.retain(|_, entry| !entry.is_expired(now));
        before - self.inner.len()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for MemoryTtlStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TtlStore for MemoryTtlStore {
    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        self.inner.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: now_millis() + ttl.as_millis() as i64,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let now = now_millis();
        if let Some(entry) = self.inner.get(key) {
            if !entry.is_expired(now) {
                return Ok(Some(entry.value.clone()));
            }
        }
        // Lazy expiry
        self.inner.remove_if(key, |_, entry| entry.is_expired(now));
        Ok(None)
    }

    async fn incr(&self, key: &str, ttl: Duration) -> Result<u64, StoreError> {
        let now = now_millis();
        let mut entry = self.inner.entry(key.to_string()).or_insert_with(|| Entry {
            value: "0".to_string(),
            expires_at: now + ttl.as_millis() as i64,
        });
        if entry.is_expired(now) {
            // Window elapsed: restart the counter and the TTL
            entry.value = "0".to_string();
            entry.expires_at = now + ttl.as_millis() as i64;
        }
        let count = entry.value.parse::<u64>().unwrap_or(0) + 1;
        entry.value = count.to_string();
        Ok(count)
    }

    async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_get_roundtrip() {
        let store = MemoryTtlStore::new();
        store
            .put("k", "v".into(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some("v".to_string()));
    }

    #[tokio::test]
    async fn expired_key_reads_as_absent() {
        let store = MemoryTtlStore::new();
        store
            .put("k", "v".into(), Duration::from_millis(10))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn incr_counts_within_window() {
        let store = MemoryTtlStore::new();
        assert_eq!(store.incr("c", Duration::from_secs(60)).await.unwrap(), 1);
        assert_eq!(store.incr("c", Duration::from_secs(60)).await.unwrap(), 2);
        assert_eq!(store.incr("c", Duration::from_secs(60)).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn incr_restarts_after_window() {
        let store = MemoryTtlStore::new();
        store.incr("c", Duration::from_millis(20)).await.unwrap();
        store.incr("c", Duration::from_millis(20)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.incr("c", Duration::from_millis(20)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cleanup_drops_expired_entries() {
        let store = MemoryTtlStore::new();
        store
            .put("dead", "v".into(), Duration::from_millis(5))
            .await
            .unwrap();
        store
            .put("live", "v".into(), Duration::from_secs(60))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.cleanup(), 1);
        assert_eq!(store.len(), 1);
    }
}
