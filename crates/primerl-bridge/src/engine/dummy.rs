//! In-memory adapter that synthesizes tokens, used for development and tests.

use super::{DecodeToken, EngineAdapter, PrefillResult};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

#[derive(Default)]
pub struct DummyEngine {
    counter: AtomicU64,
}

impl DummyEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn now_us() -> i64 {
        chrono::Utc::now().timestamp_micros()
    }
}

#[async_trait]
impl EngineAdapter for DummyEngine {
    async fn prefill(
        &self,
        _model: &str,
        prompt: &str,
        _grammar: Option<&str>,
    ) -> anyhow::Result<PrefillResult> {
        let id = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(PrefillResult {
            engine_session_id: format!("dummy-{id}"),
            prompt_tokens: prompt.split_whitespace().count() as u64,
        })
    }

    async fn continue_decode(
        &self,
        _session_id: &str,
        _obs: &str,
        max_new: u32,
        _grammar: Option<&str>,
        _speculative: bool,
        _prompt: Option<&str>,
    ) -> anyhow::Result<mpsc::Receiver<DecodeToken>> {
        let (tx, rx) = mpsc::channel(max_new.max(1) as usize);
        tokio::spawn(async move {
            for idx in 0..max_new {
                let token = DecodeToken {
                    token: format!("tok-{idx}"),
                    t_us: Self::now_us(),
                    kv_bytes: (idx as u64 + 1) * 1024,
                    boundary: idx + 1 == max_new,
                    accepted: None,
                };
                if tx.send(token).await.is_err() {
                    break;
                }
            }
        });
        Ok(rx)
    }

    async fn close_session(&self, _session_id: &str) -> anyhow::Result<()> {
        Ok(())
    }
}
