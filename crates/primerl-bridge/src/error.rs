//! Error taxonomy mapping onto the RPC error codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Errors that can abort an RPC. Everything else (cache, verifier, router,
/// engine-close failures) is swallowed at the call site and never
/// reaches this type.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("unknown session: {0}")]
    UnknownSession(String),

    #[error("missing required field: {0}")]
    InvalidArgument(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            BridgeError::UnknownSession(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            BridgeError::InvalidArgument(_) => (StatusCode::BAD_REQUEST, "INVALID_ARGUMENT"),
            BridgeError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        };
        let body = ErrorBody {
            code,
            message: self.to_string(),
        };
        (status, axum::Json(body)).into_response()
    }
}
