//! API routing: the three PrimeRL RPCs plus OpenAPI docs.

use super::{handlers, middleware, ws};
use crate::service::ServingService;
use axum::{
    middleware as axum_middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(handlers::start_episode, handlers::end_episode),
    components(schemas(
        handlers::StartEpisodeRequest,
        handlers::StartEpisodeResponse,
        handlers::EndEpisodeResponse
    )),
    tags((name = "primerl", description = "Inference-serving control bridge"))
)]
struct ApiDoc;

pub fn build_router(service: Arc<ServingService>) -> Router {
    Router::new()
        .route("/v1/episodes", post(handlers::start_episode))
        .route("/v1/episodes/:session_id", delete(handlers::end_episode))
        .route("/v1/step", get(ws::step_handler))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}
