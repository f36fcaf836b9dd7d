//! Draft-and-verify speculation with grammar boundary gating.

use crate::engine::{DecodeToken, EngineAdapter};

pub struct SpeculationRequest<'a> {
    pub session_id: &'a str,
    pub obs: &'a str,
    pub max_new: u32,
    pub grammar: &'a str,
    pub prompt: Option<&'a str>,
}

/// Runs the draft engine until a boundary token or `max_new` is reached,
/// then asks the target for exactly as many tokens, and reconciles them
/// into an acceptance mask. Draft and target may be the same adapter but
/// are treated as logically distinct roles.
pub async fn generate(
    draft: &dyn EngineAdapter,
    target: &dyn EngineAdapter,
    req: &SpeculationRequest<'_>,
) -> anyhow::Result<(Vec<DecodeToken>, Vec<bool>)> {
    let mut draft_tokens = Vec::new();
    let mut draft_rx = draft
        .continue_decode(
            req.session_id,
            req.obs,
            req.max_new,
            Some(req.grammar),
            false,
            req.prompt,
        )
        .await?;
    while let Some(token) = draft_rx.recv().await {
        let boundary = token.boundary;
        draft_tokens.push(token);
        if boundary || draft_tokens.len() as u32 >= req.max_new {
            break;
        }
    }

    let mut target_tokens = Vec::new();
    if !draft_tokens.is_empty() {
        let mut target_rx = target
            .continue_decode(
                req.session_id,
                req.obs,
                draft_tokens.len() as u32,
                Some(req.grammar),
                false,
                req.prompt,
            )
            .await?;
        while let Some(token) = target_rx.recv().await {
            target_tokens.push(token);
            if target_tokens.len() >= draft_tokens.len() {
                break;
            }
        }
    }

    let mut accepted_mask = Vec::new();
    for (idx, draft_token) in draft_tokens.iter().enumerate() {
        if idx >= target_tokens.len() {
            draft_tokens.truncate(idx);
            break;
        }
        let accepted = draft_token.token == target_tokens[idx].token;
        accepted_mask.push(accepted);
        if !accepted {
            draft_tokens.truncate(idx + 1);
            break;
        }
    }

    if accepted_mask.is_empty() && !draft_tokens.is_empty() {
        accepted_mask = vec![true; draft_tokens.len()];
    }

    for (token, accepted) in draft_tokens.iter_mut().zip(accepted_mask.iter()) {
        token.accepted = Some(*accepted);
    }

    Ok((draft_tokens, accepted_mask))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineAdapter;
    use async_trait::async_trait;
    use tokio::sync::mpsc;

    struct ScriptedEngine {
        tokens: Vec<DecodeToken>,
    }

    fn tok(s: &str, boundary: bool) -> DecodeToken {
        DecodeToken {
            token: s.to_string(),
            t_us: 0,
            kv_bytes: 0,
            boundary,
            accepted: None,
        }
    }

    #[async_trait]
    impl EngineAdapter for ScriptedEngine {
        async fn prefill(
            &self,
            _model: &str,
            _prompt: &str,
            _grammar: Option<&str>,
        ) -> anyhow::Result<crate::engine::PrefillResult> {
            unimplemented!()
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
            let (tx, rx) = mpsc::channel(self.tokens.len().max(1));
            let take = (max_new as usize).min(self.tokens.len());
            for token in self.tokens.iter().take(take).cloned() {
                tx.send(token).await.unwrap();
            }
            Ok(rx)
        }

        async fn close_session(&self, _session_id: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn matching_draft_and_target_is_fully_accepted() {
        let draft = ScriptedEngine {
            tokens: vec![tok("a", false), tok("b", true)],
        };
        let target = ScriptedEngine {
            tokens: vec![tok("a", false), tok("b", false)],
        };
        let req = SpeculationRequest {
            session_id: "s",
            obs: "o",
            max_new: 10,
            grammar: "g",
            prompt: None,
        };
        let (tokens, mask) = generate(&draft, &target, &req).await.unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(mask, vec![true, true]);
    }

    #[tokio::test]
    async fn divergence_truncates_at_mismatch() {
        let draft = ScriptedEngine {
            tokens: vec![tok("a", false), tok("b", true)],
        };
        let target = ScriptedEngine {
            tokens: vec![tok("a", false), tok("c", false)],
        };
        let req = SpeculationRequest {
            session_id: "s",
            obs: "o",
            max_new: 10,
            grammar: "g",
            prompt: None,
        };
        let (tokens, mask) = generate(&draft, &target, &req).await.unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(mask, vec![true, false]);
        assert_eq!(tokens[1].token, "b");
    }

    #[tokio::test]
    async fn target_running_short_truncates_drafts() {
        let draft = ScriptedEngine {
            tokens: vec![tok("a", false), tok("b", false), tok("c", true)],
        };
        let target = ScriptedEngine {
            tokens: vec![tok("a", false)],
        };
        let req = SpeculationRequest {
            session_id: "s",
            obs: "o",
            max_new: 10,
            grammar: "g",
            prompt: None,
        };
        let (tokens, mask) = generate(&draft, &target, &req).await.unwrap();
        assert_eq!(tokens.len(), 1);
        assert_eq!(mask, vec![true]);
    }

    #[tokio::test]
    async fn empty_streams_synthesize_nothing() {
        let draft = ScriptedEngine { tokens: vec![] };
        let target = ScriptedEngine { tokens: vec![] };
        let req = SpeculationRequest {
            session_id: "s",
            obs: "o",
            max_new: 10,
            grammar: "g",
            prompt: None,
        };
        let (tokens, mask) = generate(&draft, &target, &req).await.unwrap();
        assert!(tokens.is_empty());
        assert!(mask.is_empty());
    }
}
