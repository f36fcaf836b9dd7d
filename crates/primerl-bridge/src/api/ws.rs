//! Step bidirectional stream, realized over a WebSocket connection:
//! each inbound text frame is a StepReq, each outbound text frame a StepResp.

use crate::service::ServingService;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

#[derive(Debug, Deserialize)]
struct StepReq {
    session_id: String,
    obs: String,
    #[serde(default = "default_max_new_tokens")]
    max_new_tokens: u32,
    #[serde(default)]
    grammar_id: String,
    #[serde(default)]
    speculative: bool,
}

fn default_max_new_tokens() -> u32 {
    128
}

#[derive(Debug, Serialize)]
struct StepResp {
    token: String,
    t_us: i64,
    kv_bytes: u64,
    boundary: bool,
    accepted: bool,
}

#[derive(Debug, Serialize)]
struct StepError {
    error: String,
}

pub async fn step_handler(
    ws: WebSocketUpgrade,
    State(service): State<Arc<ServingService>>,
) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, service))
}

async fn handle_socket(mut socket: WebSocket, service: Arc<ServingService>) {
    loop {
        let text = match socket.recv().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => {
                debug!("Step client closed connection");
                break;
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => {
                error!("Step socket error: {err}");
                break;
            }
        };

        let req: StepReq = match serde_json::from_str(&text) {
            Ok(req) => req,
            Err(err) => {
                let _ = send_error(&mut socket, format!("invalid StepReq: {err}")).await;
                continue;
            }
        };

        let mut rx = match service
            .step(
                &req.session_id,
                req.obs,
                req.max_new_tokens,
                req.grammar_id,
                req.speculative,
            )
            .await
        {
            Ok(rx) => rx,
            Err(err) => {
                let _ = send_error(&mut socket, err.to_string()).await;
                continue;
            }
        };

        while let Some(token) = rx.recv().await {
            let resp = StepResp {
                token: token.token,
                t_us: token.t_us,
                kv_bytes: token.kv_bytes,
                boundary: token.boundary,
                accepted: token.accepted,
            };
            match serde_json::to_string(&resp) {
                Ok(json) => {
                    if socket.send(Message::Text(json)).await.is_err() {
                        return;
                    }
                }
                Err(err) => error!("failed to serialize StepResp: {err}"),
            }
        }
    }
}

async fn send_error(socket: &mut WebSocket, message: String) -> Result<(), axum::Error> {
    let body = serde_json::to_string(&StepError { error: message }).unwrap_or_default();
    socket.send(Message::Text(body)).await
}
