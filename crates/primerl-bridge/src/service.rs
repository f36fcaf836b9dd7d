//! Composition root binding registry, router, cache, batcher, speculator,
//! and session manager into the three public RPCs.

use crate::batcher::{Batcher, DecodeArgs};
use crate::cache::{CacheIndex, PrefixCache};
use crate::config::BridgeConfig;
use crate::engine::EngineAdapter;
use crate::error::BridgeError;
use crate::fingerprint;
use crate::kv::kv_bytes;
use crate::observability;
use crate::registry::Registry;
use crate::router::{Router, RoutingRequest};
use crate::session::SessionManager;
use crate::speculator::{self, SpeculationRequest};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

pub struct StepToken {
    pub token: String,
    pub t_us: i64,
    pub kv_bytes: u64,
    pub boundary: bool,
    pub accepted: bool,
}

pub struct ServingService {
    config: BridgeConfig,
    registry: Arc<Registry>,
    cache_index: Arc<CacheIndex>,
    prefix_cache: Arc<dyn PrefixCache>,
    session_manager: Arc<SessionManager>,
    engine: Arc<dyn EngineAdapter>,
    batcher: Batcher,
    http_client: reqwest::Client,
}

impl ServingService {
    pub fn new(
        config: BridgeConfig,
        registry: Arc<Registry>,
        cache_index: Arc<CacheIndex>,
        prefix_cache: Arc<dyn PrefixCache>,
        engine: Arc<dyn EngineAdapter>,
    ) -> Self {
        let batcher = Batcher::spawn(Arc::clone(&engine), Default::default());
        Self {
            config,
            registry,
            cache_index,
            prefix_cache,
            session_manager: Arc::new(SessionManager::new()),
            engine,
            batcher,
            http_client: reqwest::Client::new(),
        }
    }

    #[instrument(skip(self, prompt))]
    pub async fn start_episode(
        &self,
        env_id: String,
        model: String,
        prompt: String,
        prompt_fp: Option<[u8; 16]>,
        pin_prefill: bool,
    ) -> Result<(String, bool), BridgeError> {
        let fp = match prompt_fp {
            Some(fp) => Some(fp),
            None if !prompt.is_empty() => Some(fingerprint::fingerprint(&prompt)),
            None => None,
        };

        let mut cache_hit = false;
        if let Some(fp) = fp {
            if self.prefix_cache.get(&fp).await.is_some() {
                cache_hit = true;
                observability::record_cache_hit(&model);
            } else {
                observability::record_cache_miss(&model);
            }
        }

        let session_id = self.session_manager.start(env_id, model.clone());
        if let Some(fp) = fp {
            self.session_manager
                .set_meta(&session_id, "prompt".to_string(), serde_json::json!(prompt))?;
            self.session_manager.set_meta(
                &session_id,
                "prompt_fp".to_string(),
                serde_json::json!(fingerprint::to_hex(&fp)),
            )?;
        }

        if !prompt.is_empty() {
            let word_count = prompt.split_whitespace().count() as u64;
            let estimate = kv_bytes(
                word_count,
                self.config.kv_shape.layers,
                self.config.kv_shape.heads,
                self.config.kv_shape.head_dim,
                self.config.kv_shape.dtype_bytes,
                1,
            );
            let router = Router::new(&self.registry);
            let warm_nodes = self.cache_index.lookup(fp.as_ref());
            let req = RoutingRequest {
                prompt_fp: fp,
                kv_estimate: estimate,
                slo_latency_ms: 250,
                model: model.clone(),
            };
            match router.route(&req, &warm_nodes) {
                Some(node_id) => info!(node_id, "routed placement (advisory)"),
                None => warn!("no placement candidate for model {model}; continuing anyway"),
            }
        }

        if pin_prefill && !prompt.is_empty() {
            let result = self
                .engine
                .prefill(&model, &prompt, None)
                .await
                .map_err(BridgeError::Internal)?;
            self.session_manager
                .bind_engine(&session_id, result.engine_session_id)?;
            observability::record_tokens("prefill", &model, result.prompt_tokens);

            if let Some(fp) = fp {
                self.cache_index.register(fp, &self.config.node_id);
                self.prefix_cache
                    .put(
                        &fp,
                        serde_json::json!({"model": model}),
                        Some(&self.config.node_id),
                        "hbm",
                    )
                    .await;
            }
        }

        Ok((session_id, cache_hit))
    }

    #[instrument(skip(self, obs))]
    pub async fn step(
        &self,
        session_id: &str,
        obs: String,
        max_new_tokens: u32,
        grammar_id: String,
        speculative: bool,
    ) -> Result<mpsc::Receiver<StepToken>, BridgeError> {
        let session = self.session_manager.get(session_id)?;
        let model = session.model.clone();
        let prompt = session
            .meta
            .get("prompt")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();

        observability::queue_depth_inc(&model);

        let tokens = if speculative && !grammar_id.is_empty() {
            let spec_req = SpeculationRequest {
                session_id,
                obs: &obs,
                max_new: max_new_tokens,
                grammar: &grammar_id,
                prompt: if prompt.is_empty() { None } else { Some(&prompt) },
            };
            match speculator::generate(self.engine.as_ref(), self.engine.as_ref(), &spec_req).await {
                Ok(result) => Ok(result),
                Err(err) => {
                    warn!("speculation failed, falling back to non-speculative decode: {err}");
                    self.decode_with_failover(session_id, &model, &obs, max_new_tokens, &grammar_id, &prompt)
                        .await
                }
            }
        } else {
            self.decode_with_failover(session_id, &model, &obs, max_new_tokens, &grammar_id, &prompt)
                .await
        };

        observability::queue_depth_dec(&model);
        let (tokens, mask) = tokens?;

        let mut token_strings = Vec::with_capacity(tokens.len());
        let mut accepted_mask = Vec::with_capacity(tokens.len());
        let (tx, rx) = mpsc::channel(tokens.len().max(1));
        for (token, accepted) in tokens.into_iter().zip(mask) {
            self.session_manager.touch(session_id, token.kv_bytes)?;
            observability::record_tokens("decode", &model, 1);
            observability::observe_latency("Step", &model, token.t_us as f64 / 1_000_000.0);
            observability::set_kv_resident_bytes(&model, token.kv_bytes as i64);

            token_strings.push(token.token.clone());
            accepted_mask.push(accepted);

            let _ = tx
                .send(StepToken {
                    token: token.token,
                    t_us: token.t_us,
                    kv_bytes: token.kv_bytes,
                    boundary: token.boundary,
                    accepted,
                })
                .await;
        }

        self.session_manager
            .record_tokens(session_id, &token_strings, &accepted_mask)?;

        Ok(rx)
    }

    async fn decode_with_failover(
        &self,
        session_id: &str,
        model: &str,
        obs: &str,
        max_new: u32,
        grammar_id: &str,
        prompt: &str,
    ) -> Result<(Vec<crate::engine::DecodeToken>, Vec<bool>), BridgeError> {
        let session = self.session_manager.get(session_id)?;
        let engine_session_id = session.engine_session_id.clone().unwrap_or_default();
        let grammar = (!grammar_id.is_empty()).then(|| grammar_id.to_string());

        let args = DecodeArgs {
            session_id: engine_session_id,
            model: model.to_string(),
            obs: obs.to_string(),
            max_new,
            grammar: grammar.clone(),
            speculative: false,
            prompt: (!prompt.is_empty()).then(|| prompt.to_string()),
        };

        match self.batcher.submit(args).await {
            Ok(tokens) => {
                let len = tokens.len();
                Ok((tokens, vec![true; len]))
            }
            Err(err) => {
                warn!("decode failed, attempting failover replay: {err}");
                self.failover_replay(session_id, model, obs, max_new, grammar, prompt)
                    .await
            }
        }
    }

    /// Re-prefill and retry exactly once.
    async fn failover_replay(
        &self,
        session_id: &str,
        model: &str,
        obs: &str,
        max_new: u32,
        grammar: Option<String>,
        prompt: &str,
    ) -> Result<(Vec<crate::engine::DecodeToken>, Vec<bool>), BridgeError> {
        if prompt.is_empty() {
            return Err(BridgeError::Internal(anyhow::anyhow!(
                "decode failed and no prompt available for failover"
            )));
        }

        let result = self
            .engine
            .prefill(model, prompt, grammar.as_deref())
            .await
            .map_err(BridgeError::Internal)?;
        self.session_manager
            .bind_engine(session_id, result.engine_session_id.clone())?;

        let args = DecodeArgs {
            session_id: result.engine_session_id,
            model: model.to_string(),
            obs: obs.to_string(),
            max_new,
            grammar,
            speculative: false,
            prompt: Some(prompt.to_string()),
        };
        let tokens = self
            .batcher
            .submit(args)
            .await
            .map_err(BridgeError::Internal)?;
        let len = tokens.len();
        Ok((tokens, vec![true; len]))
    }

    #[instrument(skip(self))]
    pub async fn end_episode(&self, session_id: &str) -> Result<bool, BridgeError> {
        let start = Instant::now();
        let session = self.session_manager.get(session_id)?;

        if let Some(engine_session_id) = &session.engine_session_id {
            if let Err(err) = self.engine.close_session(engine_session_id).await {
                warn!("engine close_session failed, ignoring: {err}");
            }
        }

        if let Some(verifier_url) = &self.config.verifier_url {
            let payload = serde_json::json!({
                "episode_id": session_id,
                "model": session.model,
                "prompt_fp": session.meta.get("prompt_fp"),
                "tokens": session.tokens.join(" "),
                "accepted_mask": session.accepted_mask,
                "tools": session.tools,
                "metrics": { "kv_bytes": session.kv_bytes },
                "policy_meta": { "sandbox_profile": "default", "egress_blocked": true },
                "meta": session.meta,
            });

            let client = self.http_client.clone();
            let url = format!("{verifier_url}/verify");
            match client
                .post(&url)
                .json(&payload)
                .timeout(Duration::from_secs(30))
                .send()
                .await
            {
                Ok(resp) => match resp.json::<serde_json::Value>().await {
                    Ok(body) => {
                        let _ = self.session_manager.set_verifier_result(session_id, body);
                    }
                    Err(err) => warn!("verifier response was not valid JSON, ignoring: {err}"),
                },
                Err(err) => warn!("verifier POST failed, dropping result: {err}"),
            }
        }

        self.session_manager.end(session_id)?;
        observability::observe_latency("EndEpisode", &session.model, start.elapsed().as_secs_f64());
        Ok(true)
    }
}
