//! PrimeRL inference-serving control bridge (primerl-bridged)
//!
//! Standalone service that sits between RL trainers/evaluation harnesses
//! and one of several pluggable model-execution engines, coordinating
//! prefix reuse, batching, speculative decoding, placement, and failover.
//!
//! REST: `/v1/episodes` (StartEpisode/EndEpisode)
//! WebSocket: `/v1/step` (Step bidi-stream)

use anyhow::Result;
use primerl_bridge::api;
use primerl_bridge::cache::{CacheIndex, LocalPrefixCache, PrefixCache, RedisPrefixCache};
use primerl_bridge::config::BridgeConfig;
use primerl_bridge::engine::{DummyEngine, EngineAdapter, HttpEngine};
use primerl_bridge::registry::Registry;
use primerl_bridge::service::ServingService;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,primerl_bridge=debug")))
        .init();

    info!("Starting PrimeRL serving bridge (primerl-bridged)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = BridgeConfig::from_env();

    if let Some(metrics_addr) = config.metrics_bind_addr {
        primerl_bridge::observability::install(metrics_addr)?;
        info!("Metrics exporter listening on http://{metrics_addr}/metrics");
    }

    let engine: Arc<dyn EngineAdapter> = match config.engine_kind.as_str() {
        "dummy" => Arc::new(DummyEngine::new()),
        "http" => {
            let base_url = config
                .engine_base_url
                .clone()
                .ok_or_else(|| anyhow::anyhow!("PRIMERL_ENGINE_BASE_URL required for the http engine"))?;
            Arc::new(HttpEngine::new(base_url)?)
        }
        other => anyhow::bail!("unknown PRIMERL_ENGINE kind: {other}"),
    };

    let prefix_cache: Arc<dyn PrefixCache> = match &config.redis_url {
        Some(url) => {
            info!("Using Redis-backed prefix cache at {url}");
            Arc::new(RedisPrefixCache::connect(url).await?)
        }
        None => {
            info!("REDIS_URL unset; using in-memory prefix cache");
            Arc::new(LocalPrefixCache::new())
        }
    };

    let registry = Arc::new(Registry::new());
    let cache_index = Arc::new(CacheIndex::new());

    let bind_addr = config.bind_addr;
    let service = Arc::new(ServingService::new(
        config,
        registry,
        cache_index,
        prefix_cache,
        engine,
    ));

    let app = api::build_router(service);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("primerl-bridged listening on http://{bind_addr}");
    info!("Step stream: ws://{bind_addr}/v1/step");
    info!("Swagger UI: http://{bind_addr}/docs");

    axum::serve(listener, app).await?;

    Ok(())
}
