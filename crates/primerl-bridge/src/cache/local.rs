//! In-memory `PrefixCache` used when `REDIS_URL` is unset and in tests.

use super::{PrefixCache, PrefixCacheEntry};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

#[derive(Default)]
pub struct LocalPrefixCache {
    entries: RwLock<HashMap<[u8; 16], PrefixCacheEntry>>,
}

impl LocalPrefixCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn now() -> f64 {
        chrono::Utc::now().timestamp_millis() as f64 / 1000.0
    }
}

#[async_trait]
impl PrefixCache for LocalPrefixCache {
    async fn put(
        &self,
        fp: &[u8; 16],
        meta: serde_json::Value,
        node_id: Option<&str>,
        tier: &str,
    ) {
        let mut nodes = HashSet::new();
        if let Some(id) = node_id {
            nodes.insert(id.to_string());
        }
        let mut entries = self.entries.write().expect("prefix cache lock poisoned");
        entries.insert(
            *fp,
            PrefixCacheEntry {
                meta,
                ts: Self::now(),
                tier: tier.to_string(),
                nodes,
                hits: 0,
            },
        );
    }

    async fn get(&self, fp: &[u8; 16]) -> Option<PrefixCacheEntry> {
        let mut entries = self.entries.write().expect("prefix cache lock poisoned");
        let entry = entries.get_mut(fp)?;
        entry.hits += 1;
        Some(entry.clone())
    }

    async fn register_node(&self, fp: &[u8; 16], node_id: &str) {
        let mut entries = self.entries.write().expect("prefix cache lock poisoned");
        if let Some(entry) = entries.get_mut(fp) {
            entry.nodes.insert(node_id.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_is_a_hit_and_increments_counter() {
        let cache = LocalPrefixCache::new();
        let fp = [1u8; 16];
        cache
            .put(&fp, serde_json::json!({"model": "m"}), Some("node-a"), "hbm")
            .await;

        let first = cache.get(&fp).await.unwrap();
        assert_eq!(first.hits, 1);
        let second = cache.get(&fp).await.unwrap();
        assert_eq!(second.hits, 2);
    }

    #[tokio::test]
    async fn miss_returns_none() {
        let cache = LocalPrefixCache::new();
        assert!(cache.get(&[9u8; 16]).await.is_none());
    }

    #[tokio::test]
    async fn register_node_unions_rather_than_overwrites() {
        let cache = LocalPrefixCache::new();
        let fp = [2u8; 16];
        cache.put(&fp, serde_json::json!({}), Some("node-a"), "hbm").await;
        cache.register_node(&fp, "node-b").await;

        let entry = cache.get(&fp).await.unwrap();
        assert_eq!(entry.nodes.len(), 2);
        assert!(entry.nodes.contains("node-a"));
        assert!(entry.nodes.contains("node-b"));
    }
}
