//! Unary RPC handlers: StartEpisode and EndEpisode.

use crate::error::BridgeError;
use crate::fingerprint;
use crate::service::ServingService;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct StartEpisodeRequest {
    pub env_id: String,
    pub model: String,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub prompt_fp: Option<String>,
    #[serde(default)]
    pub pin_prefill: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StartEpisodeResponse {
    pub session_id: String,
    pub cache_hit: bool,
}

#[utoipa::path(
    post,
    path = "/v1/episodes",
    request_body = StartEpisodeRequest,
    responses((status = 200, body = StartEpisodeResponse))
)]
pub async fn start_episode(
    State(service): State<Arc<ServingService>>,
    Json(req): Json<StartEpisodeRequest>,
) -> Result<Json<StartEpisodeResponse>, BridgeError> {
    if req.env_id.is_empty() || req.model.is_empty() {
        return Err(BridgeError::InvalidArgument(
            "env_id and model are required".to_string(),
        ));
    }

    let prompt_fp = req
        .prompt_fp
        .as_deref()
        .map(fingerprint::from_hex)
        .transpose()
        .map_err(BridgeError::InvalidArgument)?;

    let (session_id, cache_hit) = service
        .start_episode(req.env_id, req.model, req.prompt, prompt_fp, req.pin_prefill)
        .await?;

    Ok(Json(StartEpisodeResponse {
        session_id,
        cache_hit,
    }))
}

#[derive(Debug, Serialize, ToSchema)]
pub struct EndEpisodeResponse {
    pub evicted: bool,
}

#[utoipa::path(
    delete,
    path = "/v1/episodes/{session_id}",
    params(("session_id" = String, Path, description = "Session identifier")),
    responses((status = 200, body = EndEpisodeResponse))
)]
pub async fn end_episode(
    State(service): State<Arc<ServingService>>,
    Path(session_id): Path<String>,
) -> Result<Json<EndEpisodeResponse>, BridgeError> {
    let evicted = service.end_episode(&session_id).await?;
    Ok(Json(EndEpisodeResponse { evicted }))
}
