//! Pluggable model-execution engine adapters.

mod dummy;
mod http;

pub use dummy::DummyEngine;
pub use http::HttpEngine;

use async_trait::async_trait;
use tokio::sync::mpsc;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct DecodeToken {
    pub token: String,
    pub t_us: i64,
    pub kv_bytes: u64,
    pub boundary: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct PrefillResult {
    pub engine_session_id: String,
    pub prompt_tokens: u64,
}

/// Uniform surface over stateful (SGLang/vLLM) and stateless engines.
///
/// Adapters may require `prompt` on every decode call (stateless engines);
/// adapters that manage their own sessions may ignore it.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    async fn prefill(
        &self,
        model: &str,
        prompt: &str,
        grammar: Option<&str>,
    ) -> anyhow::Result<PrefillResult>;

    /// Streams decode tokens on the returned channel. The adapter closes the
    /// sender when generation ends; callers drain until the channel closes.
    async fn continue_decode(
        &self,
        session_id: &str,
        obs: &str,
        max_new: u32,
        grammar: Option<&str>,
        speculative: bool,
        prompt: Option<&str>,
    ) -> anyhow::Result<mpsc::Receiver<DecodeToken>>;

    /// Best-effort; failures are logged, never surfaced to the caller.
    async fn close_session(&self, session_id: &str) -> anyhow::Result<()>;
}
