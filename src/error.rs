//! Error types for the gateway.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    // Capacity errors
    #[error("Maximum of {limit} concurrent sessions reached")]
    SessionLimitExceeded { limit: usize },

    // Caller errors
    #[error("Session {id} not found")]
    SessionNotFound { id: String },

    #[error("Session {id} is closing")]
    SessionClosing { id: String },

    // Client input errors
    #[error("Audio chunk of {size} bytes exceeds maximum of {max}")]
    ChunkTooLarge { size: usize, max: usize },

    #[error("Invalid audio payload: {message}")]
    InvalidAudio { message: String },

    // Infrastructure errors
    #[error("Session store error: {source}")]
    Store { source: anyhow::Error },

    #[error("Transcription engine error: {source}")]
    Engine { source: anyhow::Error },
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, GatewayError>;
