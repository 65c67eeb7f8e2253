use super::state::AppState;
use super::{handlers, stream};
use axum::{
    routing::{delete, get},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the HTTP router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/v1/health", get(handlers::health))
        // Session inspection
        .route("/v1/sessions", get(handlers::list_sessions))
        .route("/v1/sessions/metrics", get(handlers::session_metrics))
        .route(
            "/v1/sessions/:session_id",
            delete(handlers::terminate_session),
        )
        // Streaming transcription
        .route("/v1/transcribe/stream", get(stream::stream))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}
