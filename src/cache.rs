//! TTL read cache for write-side read models

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// In-memory cache with a single time-to-live for every entry
#[derive(Debug)]
pub struct TtlCache<V> {
    ttl: Duration,
    entries: RwLock<HashMap<String, (V, Instant)>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Cached value, unless missing or expired
    pub async fn get(&self, key: &str) -> Option<V> {
        let entries = self.entries.read().await;
        entries
            .get(key)
            .filter(|(_, expires_at)| Instant::now() < *expires_at)
            .map(|(value, _)| value.clone())
    }

    pub async fn set(&self, key: impl Into<String>, value: V) {
        let expires_at = Instant::now() + self.ttl;
        self.entries
            .write()
            .await
            .insert(key.into(), (value, expires_at));
    }

    pub async fn delete(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    /// Drop expired entries
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, (_, expires_at)| now < *expires_at);
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = TtlCache::new(Duration::from_secs(60));
        cache.set("user:id:1", 42).await;
        assert_eq!(cache.get("user:id:1").await, Some(42));

        cache.delete("user:id:1").await;
        assert_eq!(cache.get("user:id:1").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire() {
        let cache = TtlCache::new(Duration::from_secs(5));
        cache.set("k", "v").await;

        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.purge_expired().await, 1);
    }

    #[test]
    fn test_overwrite_keeps_latest() {
        let cache = TtlCache::new(Duration::from_secs(60));
        tokio_test::block_on(async {
            cache.set("k", 1).await;
            cache.set("k", 2).await;
            assert_eq!(cache.get("k").await, Some(2));
        });
    }
}
