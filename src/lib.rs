pub mod audio;
pub mod config;
pub mod engine;
pub mod error;
pub mod handler;
pub mod http;
pub mod outbound;
pub mod session;
pub mod wire;

pub use audio::{EndpointConfig, EndpointDetector, EnergyVad};
pub use config::Config;
pub use engine::{MockEngine, SpeechEngine, TextGenerator};
pub use error::{GatewayError, Result};
pub use handler::{run_connection, MessageSource};
pub use http::{create_router, AppState};
pub use outbound::{MessageSink, OutboundChannel};
pub use session::{
    AggregateMetrics, MemoryStore, MetricsSnapshot, NatsKvStore, Session, SessionInfo,
    SessionManager, SessionRecord, SessionState, SessionStore, TranscriptResult,
};
pub use wire::{ClientMessage, ErrorCode, ServerMessage};
