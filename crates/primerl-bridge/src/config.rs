//! Environment-driven configuration for the serving bridge.

use std::net::SocketAddr;

/// Transformer shape used by the KV-cache estimator.
#[derive(Debug, Clone, Copy)]
pub struct TransformerShape {
    pub layers: u32,
    pub heads: u32,
    pub head_dim: u32,
    pub dtype_bytes: u32,
}

impl Default for TransformerShape {
    fn default() -> Self {
        Self {
            layers: 32,
            heads: 32,
            head_dim: 128,
            dtype_bytes: 2,
        }
    }
}

/// Bridge-wide configuration, parsed once at startup from `PRIMERL_*` env vars.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub engine_kind: String,
    pub engine_base_url: Option<String>,
    pub bind_addr: SocketAddr,
    pub metrics_bind_addr: Option<SocketAddr>,
    pub node_id: String,
    pub verifier_url: Option<String>,
    pub redis_url: Option<String>,
    pub kv_shape: TransformerShape,
}

impl BridgeConfig {
    /// Build configuration from the environment, falling back to sensible
    /// defaults for local development (mirrors the teacher's
    /// `DaemonConfig::from_env` convention).
    pub fn from_env() -> Self {
        let bind_addr = std::env::var("PRIMERL_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .map(|port| SocketAddr::from(([127, 0, 0, 1], port)))
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 50051)));

        let metrics_bind_addr = std::env::var("PRIMERL_METRICS_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .map(|port| SocketAddr::from(([127, 0, 0, 1], port)));

        Self {
            engine_kind: std::env::var("PRIMERL_ENGINE").unwrap_or_else(|_| "dummy".to_string()),
            engine_base_url: std::env::var("PRIMERL_ENGINE_BASE_URL").ok(),
            bind_addr,
            metrics_bind_addr,
            node_id: std::env::var("PRIMERL_NODE_ID").unwrap_or_else(|_| "node-local".to_string()),
            verifier_url: std::env::var("PRIMERL_VERIFIER_URL").ok(),
            redis_url: std::env::var("REDIS_URL").ok(),
            kv_shape: TransformerShape {
                layers: env_u32("PRIMERL_KV_LAYERS").unwrap_or(32),
                heads: env_u32("PRIMERL_KV_HEADS").unwrap_or(32),
                head_dim: env_u32("PRIMERL_KV_HEAD_DIM").unwrap_or(128),
                dtype_bytes: env_u32("PRIMERL_KV_DTYPE_BYTES").unwrap_or(2),
            },
        }
    }
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
