use super::state::AppState;
use crate::session::{AggregateMetrics, SessionInfo};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use tracing::info;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_sessions: usize,
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionInfo>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct TerminateResponse {
    pub status: String,
    pub session_id: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /v1/health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let active_sessions = state.manager.active_count().await;
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            active_sessions,
        }),
    )
}

/// GET /v1/sessions
/// List all sessions registered on this instance
pub async fn list_sessions(State(state): State<AppState>) -> impl IntoResponse {
    let sessions = state.manager.list_sessions().await;
    let count = sessions.len();
    (StatusCode::OK, Json(SessionListResponse { sessions, count }))
}

/// GET /v1/sessions/metrics
/// Aggregated metrics across the registry
pub async fn session_metrics(State(state): State<AppState>) -> Json<AggregateMetrics> {
    Json(state.manager.aggregate_metrics().await)
}

/// DELETE /v1/sessions/:session_id
/// Force-terminate a session (operator use)
pub async fn terminate_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    if state.manager.close_session(&session_id).await {
        info!("Force-terminated session {session_id}");
        (
            StatusCode::OK,
            Json(TerminateResponse {
                status: "closed".to_string(),
                session_id,
            }),
        )
            .into_response()
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Session {session_id} not found"),
            }),
        )
            .into_response()
    }
}
