//! Shared cache store interface.
//!
//! The shared tier of the stats cache lives behind this trait so production
//! can point it at an external cache while tests and dev mode run on the
//! in-process implementation.

use async_trait::async_trait;
use dashmap::DashMap;
use std::time::{Duration, Instant};

#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: String, ttl: Duration);
    async fn invalidate(&self, key: &str);
}

/// In-process cache store with per-entry TTL.
pub struct MemoryCacheStore {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Drop expired entries. Call periodically.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.entries.retain(|_, (_, expires_at)| *expires_at > now);
    }
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Option<String> {
        let entry = self.entries.get(key)?;
        let (value, expires_at) = entry.value();
        if *expires_at <= Instant::now() {
            drop(entry);
            self.entries.remove(key);
            return None;
        }
        Some(value.clone())
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) {
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
    }

    async fn invalidate(&self, key: &str) {
        self.entries.remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_invalidate() {
        let store = MemoryCacheStore::new();
        store
            .set("k", "v".into(), Duration::from_secs(60))
            .await;
        assert_eq!(store.get("k").await.as_deref(), Some("v"));

        store.invalidate("k").await;
        assert_eq!(store.get("k").await, None);
    }

    #[tokio::test]
    async fn test_expiry() {
        let store = MemoryCacheStore::new();
        store.set("k", "v".into(), Duration::from_millis(1)).await;
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(store.get("k").await, None);
    }
}
