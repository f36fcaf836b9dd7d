//! Decode request batcher: coalesces same-key submissions behind a
//! single-writer loop per engine adapter.

use crate::engine::{DecodeToken, EngineAdapter};
use crate::observability;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BatchKey {
    model: String,
    grammar: Option<String>,
    speculative: bool,
}

pub struct DecodeArgs {
    pub session_id: String,
    pub model: String,
    pub obs: String,
    pub max_new: u32,
    pub grammar: Option<String>,
    pub speculative: bool,
    pub prompt: Option<String>,
}

struct Submission {
    args: DecodeArgs,
    reply: oneshot::Sender<anyhow::Result<Vec<DecodeToken>>>,
}

/// Handle used by callers to submit a decode request and await its tokens.
#[derive(Clone)]
pub struct Batcher {
    tx: mpsc::UnboundedSender<Submission>,
}

#[derive(Debug, Clone, Copy)]
pub struct BatcherConfig {
    pub interval: Duration,
    pub max_batch: usize,
    pub p95_slo_ms: u64,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(8),
            max_batch: 32,
            p95_slo_ms: 300,
        }
    }
}

impl Batcher {
    pub fn spawn(engine: Arc<dyn EngineAdapter>, config: BatcherConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(engine, rx, config));
        Self { tx }
    }

    pub async fn submit(&self, args: DecodeArgs) -> anyhow::Result<Vec<DecodeToken>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Submission {
                args,
                reply: reply_tx,
            })
            .map_err(|_| anyhow::anyhow!("batcher loop has shut down"))?;
        reply_rx
            .await
            .map_err(|_| anyhow::anyhow!("batcher dropped the reply channel"))?
    }
}

fn key_of(args: &DecodeArgs) -> BatchKey {
    BatchKey {
        model: args.model.clone(),
        grammar: args.grammar.clone(),
        speculative: args.speculative,
    }
}

async fn run(
    engine: Arc<dyn EngineAdapter>,
    mut rx: mpsc::UnboundedReceiver<Submission>,
    config: BatcherConfig,
) {
    loop {
        let anchor = match tokio::time::timeout(config.interval, rx.recv()).await {
            Ok(Some(submission)) => submission,
            Ok(None) => return, // all senders dropped
            Err(_) => continue, // interval elapsed with nothing queued
        };

        let anchor_key = key_of(&anchor.args);
        let mut group = vec![anchor];
        let mut pending: Option<Submission> = None;

        while group.len() < config.max_batch {
            match rx.try_recv() {
                Ok(submission) => {
                    if key_of(&submission.args) == anchor_key {
                        group.push(submission);
                    } else {
                        pending = Some(submission);
                        break;
                    }
                }
                Err(_) => break,
            }
        }

        let start = Instant::now();
        let model = anchor_key.model.clone();
        let results = futures_util::future::join_all(
            group.iter().map(|s| decode_all(engine.as_ref(), &s.args)),
        )
        .await;

        let elapsed_ms = start.elapsed().as_millis() as u64;
        if elapsed_ms > config.p95_slo_ms {
            warn!(model, elapsed_ms, slo_ms = config.p95_slo_ms, "batch exceeded SLO");
            observability::record_slo_violation(&model);
        }

        for (submission, result) in group.into_iter().zip(results) {
            let _ = submission.reply.send(result);
        }

        // The mismatched-key submission that broke draining has no queue to
        // rejoin (this is an mpsc, not a peekable deque): drive it to
        // completion as its own singleton group instead of dropping it.
        if let Some(submission) = pending {
            let result = decode_all(engine.as_ref(), &submission.args).await;
            let _ = submission.reply.send(result);
        }
    }
}

async fn decode_all(engine: &dyn EngineAdapter, args: &DecodeArgs) -> anyhow::Result<Vec<DecodeToken>> {
    let mut rx = engine
        .continue_decode(
            &args.session_id,
            &args.obs,
            args.max_new,
            args.grammar.as_deref(),
            args.speculative,
            args.prompt.as_deref(),
        )
        .await?;
    let mut tokens = Vec::new();
    while let Some(token) = rx.recv().await {
        tokens.push(token);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::DummyEngine;

    #[tokio::test]
    async fn submit_returns_tokens_in_stream_order() {
        let batcher = Batcher::spawn(Arc::new(DummyEngine::new()), BatcherConfig::default());
        let tokens = batcher
            .submit(DecodeArgs {
                session_id: "s1".to_string(),
                model: "m".to_string(),
                obs: "obs".to_string(),
                max_new: 3,
                grammar: None,
                speculative: false,
                prompt: None,
            })
            .await
            .unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].token, "tok-0");
        assert_eq!(tokens[2].token, "tok-2");
    }

    #[tokio::test]
    async fn distinct_keys_are_each_served() {
        let batcher = Batcher::spawn(Arc::new(DummyEngine::new()), BatcherConfig::default());
        let a = batcher.submit(DecodeArgs {
            session_id: "a".to_string(),
            model: "m1".to_string(),
            obs: "obs".to_string(),
            max_new: 2,
            grammar: None,
            speculative: false,
            prompt: None,
        });
        let b = batcher.submit(DecodeArgs {
            session_id: "b".to_string(),
            model: "m2".to_string(),
            obs: "obs".to_string(),
            max_new: 2,
            grammar: None,
            speculative: false,
            prompt: None,
        });
        let (ra, rb) = tokio::join!(a, b);
        assert_eq!(ra.unwrap().len(), 2);
        assert_eq!(rb.unwrap().len(), 2);
    }
}
