//! Episode/session store and state machine.

use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Started,
    Bound,
    Decoding,
    Idle,
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    pub args: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub env_id: String,
    pub model: String,
    pub engine_session_id: Option<String>,
    pub last_touch: f64,
    pub kv_bytes: u64,
    pub tokens: Vec<String>,
    pub accepted_mask: Vec<bool>,
    pub tools: Vec<ToolCall>,
    pub meta: HashMap<String, serde_json::Value>,
    pub verifier_result: Option<serde_json::Value>,
    pub state: SessionState,
}

/// Serializable, fully-owned snapshot returned by `trace`: must not
/// alias the live session's token/mask vectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTrace {
    pub env_id: String,
    pub model: String,
    pub tokens: Vec<String>,
    pub accepted_mask: Vec<bool>,
    pub kv_bytes: u64,
    pub tools: Vec<ToolCall>,
    pub meta: HashMap<String, serde_json::Value>,
}

fn now() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, env_id: String, model: String) -> String {
        let session_id = uuid::Uuid::new_v4().to_string();
        let session = Session {
            env_id,
            model,
            engine_session_id: None,
            last_touch: now(),
            kv_bytes: 0,
            tokens: Vec::new(),
            accepted_mask: Vec::new(),
            tools: Vec::new(),
            meta: HashMap::new(),
            verifier_result: None,
            state: SessionState::Started,
        };
        self.sessions
            .write()
            .expect("session lock poisoned")
            .insert(session_id.clone(), session);
        session_id
    }

    fn with_session_mut<T>(
        &self,
        session_id: &str,
        f: impl FnOnce(&mut Session) -> T,
    ) -> Result<T, BridgeError> {
        let mut sessions = self.sessions.write().expect("session lock poisoned");
        let session = sessions
            .get_mut(session_id)
            .ok_or_else(|| BridgeError::UnknownSession(session_id.to_string()))?;
        Ok(f(session))
    }

    pub fn bind_engine(&self, session_id: &str, engine_session_id: String) -> Result<(), BridgeError> {
        self.with_session_mut(session_id, |s| {
            s.engine_session_id = Some(engine_session_id);
            s.state = SessionState::Bound;
        })
    }

    pub fn touch(&self, session_id: &str, kv_bytes: u64) -> Result<(), BridgeError> {
        self.with_session_mut(session_id, |s| {
            s.last_touch = now();
            s.kv_bytes = kv_bytes;
        })
    }

    pub fn set_decoding(&self, session_id: &str) -> Result<(), BridgeError> {
        self.with_session_mut(session_id, |s| s.state = SessionState::Decoding)
    }

    pub fn set_idle(&self, session_id: &str) -> Result<(), BridgeError> {
        self.with_session_mut(session_id, |s| s.state = SessionState::Idle)
    }

    /// Appends tokens and their acceptance mask, enforcing that both lists
    /// stay the same length.
    pub fn record_tokens(
        &self,
        session_id: &str,
        tokens: &[String],
        accepted_mask: &[bool],
    ) -> Result<(), BridgeError> {
        if tokens.len() != accepted_mask.len() {
            return Err(BridgeError::InvalidArgument(
                "tokens and accepted_mask must have equal length".to_string(),
            ));
        }
        self.with_session_mut(session_id, |s| {
            s.tokens.extend_from_slice(tokens);
            s.accepted_mask.extend_from_slice(accepted_mask);
        })
    }

    pub fn record_tool(&self, session_id: &str, tool_call: ToolCall) -> Result<(), BridgeError> {
        self.with_session_mut(session_id, |s| s.tools.push(tool_call))
    }

    pub fn set_meta(&self, session_id: &str, key: String, value: serde_json::Value) -> Result<(), BridgeError> {
        self.with_session_mut(session_id, |s| {
            s.meta.insert(key, value);
        })
    }

    pub fn set_verifier_result(&self, session_id: &str, result: serde_json::Value) -> Result<(), BridgeError> {
        self.with_session_mut(session_id, |s| s.verifier_result = Some(result))
    }

    pub fn get(&self, session_id: &str) -> Result<Session, BridgeError> {
        self.sessions
            .read()
            .expect("session lock poisoned")
            .get(session_id)
            .cloned()
            .ok_or_else(|| BridgeError::UnknownSession(session_id.to_string()))
    }

    pub fn end(&self, session_id: &str) -> Result<Session, BridgeError> {
        self.sessions
            .write()
            .expect("session lock poisoned")
            .remove(session_id)
            .ok_or_else(|| BridgeError::UnknownSession(session_id.to_string()))
    }

    /// Deep-copied snapshot; never aliases the live session's vectors.
    pub fn trace(&self, session_id: &str) -> Result<SessionTrace, BridgeError> {
        let sessions = self.sessions.read().expect("session lock poisoned");
        let s = sessions
            .get(session_id)
            .ok_or_else(|| BridgeError::UnknownSession(session_id.to_string()))?;
        Ok(SessionTrace {
            env_id: s.env_id.clone(),
            model: s.model.clone(),
            tokens: s.tokens.clone(),
            accepted_mask: s.accepted_mask.clone(),
            kv_bytes: s.kv_bytes,
            tools: s.tools.clone(),
            meta: s.meta.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_then_get_returns_started_session() {
        let mgr = SessionManager::new();
        let sid = mgr.start("env-1".to_string(), "m".to_string());
        let session = mgr.get(&sid).unwrap();
        assert_eq!(session.state, SessionState::Started);
        assert_eq!(session.env_id, "env-1");
    }

    #[test]
    fn unknown_session_errors_on_every_operation() {
        let mgr = SessionManager::new();
        assert!(matches!(mgr.get("ghost"), Err(BridgeError::UnknownSession(_))));
        assert!(matches!(
            mgr.touch("ghost", 0),
            Err(BridgeError::UnknownSession(_))
        ));
        assert!(matches!(
            mgr.end("ghost"),
            Err(BridgeError::UnknownSession(_))
        ));
    }

    #[test]
    fn record_tokens_enforces_length_invariant() {
        let mgr = SessionManager::new();
        let sid = mgr.start("env".to_string(), "m".to_string());
        let err = mgr
            .record_tokens(&sid, &["a".to_string()], &[])
            .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidArgument(_)));
    }

    #[test]
    fn trace_does_not_alias_live_state() {
        let mgr = SessionManager::new();
        let sid = mgr.start("env".to_string(), "m".to_string());
        mgr.record_tokens(&sid, &["a".to_string()], &[true]).unwrap();

        let mut trace = mgr.trace(&sid).unwrap();
        trace.tokens.push("mutated".to_string());

        let live = mgr.get(&sid).unwrap();
        assert_eq!(live.tokens, vec!["a".to_string()]);
    }

    #[test]
    fn bind_engine_transitions_to_bound() {
        let mgr = SessionManager::new();
        let sid = mgr.start("env".to_string(), "m".to_string());
        mgr.bind_engine(&sid, "engine-sess-1".to_string()).unwrap();
        let session = mgr.get(&sid).unwrap();
        assert_eq!(session.state, SessionState::Bound);
        assert_eq!(session.engine_session_id.as_deref(), Some("engine-sess-1"));
    }

    #[test]
    fn end_removes_session() {
        let mgr = SessionManager::new();
        let sid = mgr.start("env".to_string(), "m".to_string());
        mgr.end(&sid).unwrap();
        assert!(matches!(mgr.get(&sid), Err(BridgeError::UnknownSession(_))));
    }
}
