use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-session counters.
///
/// All counters are monotonically increasing and may be read concurrently
/// with updates; snapshots are taken without locking.
#[derive(Debug, Default)]
pub struct SessionMetrics {
    audio_bytes_received: AtomicU64,
    audio_chunks_received: AtomicU64,
    partials_emitted: AtomicU64,
    finals_emitted: AtomicU64,
    errors_emitted: AtomicU64,
}

impl SessionMetrics {
    pub fn record_chunk(&self, bytes: usize) {
        self.audio_bytes_received
            .fetch_add(bytes as u64, Ordering::Relaxed);
        self.audio_chunks_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_partial(&self) {
        self.partials_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_final(&self) {
        self.finals_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors_emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            audio_bytes_received: self.audio_bytes_received.load(Ordering::Relaxed),
            audio_chunks_received: self.audio_chunks_received.load(Ordering::Relaxed),
            partials_emitted: self.partials_emitted.load(Ordering::Relaxed),
            finals_emitted: self.finals_emitted.load(Ordering::Relaxed),
            errors_emitted: self.errors_emitted.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a session's counters.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub audio_bytes_received: u64,
    pub audio_chunks_received: u64,
    pub partials_emitted: u64,
    pub finals_emitted: u64,
    pub errors_emitted: u64,
}
