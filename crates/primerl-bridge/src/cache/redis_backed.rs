//! Redis-backed `PrefixCache`, matching the wire format:
//! a hash at `pf:<hex(fp)>` with fields `meta`, `ts`, `tier`, `nodes`, `hits`.

use super::{PrefixCache, PrefixCacheEntry};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashSet;
use tracing::debug;

pub struct RedisPrefixCache {
    conn: ConnectionManager,
}

impl RedisPrefixCache {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    fn key(fp: &[u8; 16]) -> String {
        format!("pf:{}", crate::fingerprint::to_hex(fp))
    }

    fn now() -> f64 {
        chrono::Utc::now().timestamp_millis() as f64 / 1000.0
    }
}

#[async_trait]
impl PrefixCache for RedisPrefixCache {
    async fn put(
        &self,
        fp: &[u8; 16],
        meta: serde_json::Value,
        node_id: Option<&str>,
        tier: &str,
    ) {
        let key = Self::key(fp);
        let nodes = node_id
            .map(|id| vec![id.to_string()])
            .unwrap_or_default();
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = async {
            conn.hset(&key, "meta", serde_json::to_string(&meta)?).await?;
            conn.hset::<_, _, _, ()>(&key, "ts", Self::now()).await?;
            conn.hset::<_, _, _, ()>(&key, "tier", tier).await?;
            if !nodes.is_empty() {
                let existing: Option<String> = conn.hget(&key, "nodes").await?;
                let merged = merge_nodes(existing.as_deref(), &nodes);
                conn.hset::<_, _, _, ()>(&key, "nodes", serde_json::to_string(&merged)?)
                    .await?;
            }
            Ok(())
        }
        .await;

        if let Err(err) = result {
            debug!("prefix cache put failed, treating as no-op: {err}");
        }
    }

    async fn get(&self, fp: &[u8; 16]) -> Option<PrefixCacheEntry> {
        let key = Self::key(fp);
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<Option<PrefixCacheEntry>> = async {
            let map: std::collections::HashMap<String, String> = conn.hgetall(&key).await?;
            if map.is_empty() {
                return Ok(None);
            }
            let meta = map
                .get("meta")
                .and_then(|raw| serde_json::from_str(raw).ok())
                .unwrap_or(serde_json::Value::Null);
            let ts = map.get("ts").and_then(|v| v.parse().ok()).unwrap_or(0.0);
            let tier = map.get("tier").cloned().unwrap_or_default();
            let nodes: HashSet<String> = map
                .get("nodes")
                .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
                .map(|v| v.into_iter().collect())
                .unwrap_or_default();
            let hits: u64 = conn.hincr(&key, "hits", 1i64).await.unwrap_or(0);

            Ok(Some(PrefixCacheEntry {
                meta,
                ts,
                tier,
                nodes,
                hits: hits.max(0) as u64,
            }))
        }
        .await;

        result.unwrap_or_else(|err| {
            debug!("prefix cache get failed, treating as miss: {err}");
            None
        })
    }

    async fn register_node(&self, fp: &[u8; 16], node_id: &str) {
        let key = Self::key(fp);
        let mut conn = self.conn.clone();
        let result: redis::RedisResult<()> = async {
            let exists: bool = conn.exists(&key).await?;
            if !exists {
                return Ok(());
            }
            let existing: Option<String> = conn.hget(&key, "nodes").await?;
            let merged = merge_nodes(existing.as_deref(), &[node_id.to_string()]);
            conn.hset::<_, _, _, ()>(&key, "nodes", serde_json::to_string(&merged)?)
                .await?;
            Ok(())
        }
        .await;

        if let Err(err) = result {
            debug!("prefix cache register_node failed, treating as no-op: {err}");
        }
    }
}

/// Union the new node ids into the existing JSON-array node set rather than
/// overwriting it (open question, resolved as union; see DESIGN.md).
fn merge_nodes(existing_json: Option<&str>, new_nodes: &[String]) -> Vec<String> {
    let mut set: HashSet<String> = existing_json
        .and_then(|raw| serde_json::from_str::<Vec<String>>(raw).ok())
        .map(|v| v.into_iter().collect())
        .unwrap_or_default();
    set.extend(new_nodes.iter().cloned());
    let mut out: Vec<String> = set.into_iter().collect();
    out.sort();
    out
}
