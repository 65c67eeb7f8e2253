use chrono::Utc;
use serde::{Deserialize, Serialize};

/// WebSocket close codes used by the gateway.
pub mod close_code {
    /// Normal closure after a stop request or server shutdown.
    pub const NORMAL: u16 = 1000;
    /// Used for both session-limit rejection and slow-client disconnection.
    pub const POLICY_VIOLATION: u16 = 1008;
    /// Unexpected server-side failure.
    pub const INTERNAL_ERROR: u16 = 1011;
}

/// Message received from a streaming client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// One chunk of base64-encoded PCM audio.
    AudioChunk { data: String },
    /// Client-initiated end of stream.
    Stop,
}

/// Message sent to a streaming client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    SessionStart { session_id: String },
    Partial { text: String, timestamp: String },
    Final { timestamp: String },
    Error { message: String, code: ErrorCode },
}

/// Machine-readable error codes surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    SessionLimit,
    ChunkTooLarge,
    InvalidAudio,
    SessionClosing,
}

impl ServerMessage {
    pub fn session_start(session_id: impl Into<String>) -> Self {
        Self::SessionStart {
            session_id: session_id.into(),
        }
    }

    pub fn partial(text: impl Into<String>) -> Self {
        Self::Partial {
            text: text.into(),
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn final_marker() -> Self {
        Self::Final {
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            code,
        }
    }

    /// Short label for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SessionStart { .. } => "session_start",
            Self::Partial { .. } => "partial",
            Self::Final { .. } => "final",
            Self::Error { .. } => "error",
        }
    }
}
