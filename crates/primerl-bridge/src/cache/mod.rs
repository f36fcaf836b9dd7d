//! Durable prefix cache and the in-process cache index.

mod index;
mod local;
mod redis_backed;

pub use index::CacheIndex;
pub use local::LocalPrefixCache;
pub use redis_backed::RedisPrefixCache;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Entry stored per fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrefixCacheEntry {
    pub meta: serde_json::Value,
    pub ts: f64,
    pub tier: String,
    pub nodes: HashSet<String>,
    pub hits: u64,
}

/// Durable key-value surface in front of the distributed prefix cache.
///
/// Implementations must swallow backend failures into `Ok(None)`/`Ok(())` —
/// the cache is a best-effort accelerator and correctness never depends on
/// it.
#[async_trait]
pub trait PrefixCache: Send + Sync {
    async fn put(
        &self,
        fp: &[u8; 16],
        meta: serde_json::Value,
        node_id: Option<&str>,
        tier: &str,
    );

    async fn get(&self, fp: &[u8; 16]) -> Option<PrefixCacheEntry>;

    async fn register_node(&self, fp: &[u8; 16], node_id: &str);
}
