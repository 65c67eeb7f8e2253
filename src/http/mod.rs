//! HTTP API server: operator inspection plus the streaming endpoint
//!
//! - GET    /v1/health                - Health probe with active count
//! - GET    /v1/sessions              - List active sessions
//! - GET    /v1/sessions/metrics      - Aggregated session metrics
//! - DELETE /v1/sessions/:session_id  - Force-terminate a session
//! - GET    /v1/transcribe/stream     - WebSocket streaming transcription

mod handlers;
mod routes;
mod state;
mod stream;

pub use routes::create_router;
pub use state::AppState;
