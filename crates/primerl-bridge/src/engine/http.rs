//! Adapter for stateful decode engines (SGLang/vLLM-style) exposing a
//! newline-delimited-JSON streaming HTTP interface.

use super::{DecodeToken, EngineAdapter, PrefillResult};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::warn;

pub struct HttpEngine {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct PrefillResponse {
    session_id: String,
    #[serde(default)]
    tokens: u64,
}

impl HttpEngine {
    pub fn new(base_url: String) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl EngineAdapter for HttpEngine {
    async fn prefill(
        &self,
        model: &str,
        prompt: &str,
        grammar: Option<&str>,
    ) -> anyhow::Result<PrefillResult> {
        let resp: PrefillResponse = self
            .client
            .post(format!("{}/prefill", self.base_url))
            .json(&serde_json::json!({
                "model": model,
                "prompt": prompt,
                "grammar": grammar,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(PrefillResult {
            engine_session_id: resp.session_id,
            prompt_tokens: resp.tokens,
        })
    }

    async fn continue_decode(
        &self,
        session_id: &str,
        obs: &str,
        max_new: u32,
        grammar: Option<&str>,
        speculative: bool,
        _prompt: Option<&str>,
    ) -> anyhow::Result<mpsc::Receiver<DecodeToken>> {
        let resp = self
            .client
            .post(format!("{}/decode", self.base_url))
            .json(&serde_json::json!({
                "session_id": session_id,
                "obs": obs,
                "max_new_tokens": max_new,
                "grammar": grammar,
                "speculative": speculative,
            }))
            .send()
            .await?
            .error_for_status()?;

        let (tx, rx) = mpsc::channel(max_new.max(1) as usize);
        let mut byte_stream = resp.bytes_stream();
        tokio::spawn(async move {
            let mut buf = String::new();
            while let Some(chunk) = byte_stream.next().await {
                let chunk = match chunk {
                    Ok(c) => c,
                    Err(err) => {
                        warn!("engine decode stream error: {err}");
                        break;
                    }
                };
                buf.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].trim().to_string();
                    buf.drain(..=pos);
                    if line.is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<DecodeToken>(&line) {
                        Ok(token) => {
                            if tx.send(token).await.is_err() {
                                return;
                            }
                        }
                        Err(err) => warn!("malformed decode token, skipping: {err}"),
                    }
                }
            }
        });
        Ok(rx)
    }

    async fn close_session(&self, session_id: &str) -> anyhow::Result<()> {
        let result = self
            .client
            .post(format!("{}/close", self.base_url))
            .json(&serde_json::json!({ "session_id": session_id }))
            .timeout(Duration::from_secs(30))
            .send()
            .await;

        if let Err(err) = result {
            warn!("engine close_session failed, ignoring: {err}");
        }
        Ok(())
    }
}
