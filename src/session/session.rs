use super::metrics::{MetricsSnapshot, SessionMetrics};
use super::store::SessionRecord;
use crate::audio::{EndpointConfig, EndpointDetector};
use crate::engine::SpeechEngine;
use crate::error::{GatewayError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

/// Lifecycle state of a session.
///
/// Transitions are monotonic: `Created -> Active -> Closing -> Closed`.
/// `Closing` and `Closed` are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum SessionState {
    Created = 0,
    Active = 1,
    Closing = 2,
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Active,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }
}

/// Result of processing one audio chunk.
#[derive(Debug, Clone)]
pub struct TranscriptResult {
    pub text: String,
    pub is_final: bool,
}

/// Inspection projection of a session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub metrics: MetricsSnapshot,
}

struct Activity {
    wall: DateTime<Utc>,
    instant: Instant,
}

/// One logical connection's transcription state.
///
/// The session owns its endpoint detector exclusively; the engine is shared
/// infrastructure. Callers must serialize `process_chunk` calls per session
/// (one connection produces one chunk stream), but `close` may race an
/// in-flight chunk safely.
pub struct Session {
    id: String,
    owner_id: String,
    state: AtomicU8,
    created_at: DateTime<Utc>,
    activity: RwLock<Activity>,
    metrics: SessionMetrics,
    engine: Arc<dyn SpeechEngine>,
    detector: Mutex<EndpointDetector>,
    bytes_per_ms: f64,
}

impl Session {
    pub fn new(
        owner_id: impl Into<String>,
        endpoint_config: &EndpointConfig,
        engine: Arc<dyn SpeechEngine>,
        bytes_per_ms: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            state: AtomicU8::new(SessionState::Created as u8),
            created_at: now,
            activity: RwLock::new(Activity {
                wall: now,
                instant: Instant::now(),
            }),
            metrics: SessionMetrics::default(),
            engine,
            detector: Mutex::new(EndpointDetector::new(endpoint_config)),
            bytes_per_ms,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// True while the session counts toward concurrency limits.
    pub fn is_active(&self) -> bool {
        matches!(self.state(), SessionState::Created | SessionState::Active)
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    /// Time since the last accepted audio unit.
    pub fn idle_for(&self) -> Duration {
        self.activity
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .instant
            .elapsed()
    }

    pub fn last_activity_at(&self) -> DateTime<Utc> {
        self.activity
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .wall
    }

    /// Process one pre-validated audio chunk.
    ///
    /// The connection handler rejects oversized or undecodable input before
    /// it reaches the session; size is not re-checked here.
    pub async fn process_chunk(&self, audio: &[u8]) -> Result<TranscriptResult> {
        if self.state() >= SessionState::Closing {
            return Err(GatewayError::SessionClosing {
                id: self.id.clone(),
            });
        }

        let previous = self
            .state
            .fetch_max(SessionState::Active as u8, Ordering::SeqCst);
        if previous == SessionState::Created as u8 {
            info!("session {}: created -> active", self.id);
        }

        self.touch();
        self.metrics.record_chunk(audio.len());

        let mut detector = self.detector.lock().await;
        if detector.accept(audio) {
            drop(detector);
            let text = self
                .engine
                .transcribe_chunk(audio)
                .await
                .map_err(|source| GatewayError::Engine { source })?;
            self.metrics.record_partial();
            return Ok(TranscriptResult {
                text,
                is_final: false,
            });
        }

        detector.silence_elapsed(audio.len() as f64 / self.bytes_per_ms);
        if detector.should_finalize() {
            debug!(
                "session {}: utterance boundary after {} speech bytes",
                self.id,
                detector.speech_bytes()
            );
            detector.reset();
            drop(detector);
            // Flush any text the engine still holds for this utterance
            let text = self
                .engine
                .finalize()
                .await
                .map_err(|source| GatewayError::Engine { source })?;
            self.metrics.record_final();
            return Ok(TranscriptResult {
                text,
                is_final: true,
            });
        }

        // Silence below the threshold: empty non-final result, and no
        // engine call on confirmed silence.
        Ok(TranscriptResult {
            text: String::new(),
            is_final: false,
        })
    }

    /// Close the session. Idempotent; safe to call concurrently with an
    /// in-flight `process_chunk` or another `close`.
    pub async fn close(&self) {
        let previous = self
            .state
            .fetch_max(SessionState::Closing as u8, Ordering::SeqCst);
        if previous >= SessionState::Closing as u8 {
            return;
        }

        let mut detector = self.detector.lock().await;
        detector.reset();
        drop(detector);

        self.state
            .fetch_max(SessionState::Closed as u8, Ordering::SeqCst);
        info!(
            "session {}: {} -> closed",
            self.id,
            SessionState::from_u8(previous).as_str()
        );
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id.clone(),
            state: self.state(),
            created_at: self.created_at,
            last_activity_at: self.last_activity_at(),
            metrics: self.metrics.snapshot(),
        }
    }

    /// Store-facing projection. Never contains live audio.
    pub fn record(&self) -> SessionRecord {
        SessionRecord {
            session_id: self.id.clone(),
            state: self.state(),
            owner_id: self.owner_id.clone(),
            created_at: self.created_at,
            last_activity_at: self.last_activity_at(),
            metrics: self.metrics.snapshot(),
        }
    }

    fn touch(&self) {
        let mut activity = self.activity.write().unwrap_or_else(|e| e.into_inner());
        activity.wall = Utc::now();
        activity.instant = Instant::now();
    }
}
