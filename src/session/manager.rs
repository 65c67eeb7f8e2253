use super::session::{Session, SessionInfo};
use super::store::SessionStore;
use crate::audio::EndpointConfig;
use crate::config::Config;
use crate::engine::SpeechEngine;
use crate::error::{GatewayError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Metrics aggregated across the local registry.
#[derive(Debug, Clone, Serialize)]
pub struct AggregateMetrics {
    pub active_sessions: usize,
    pub total_sessions: usize,
    pub total_audio_bytes: u64,
    pub total_audio_duration_ms: f64,
    pub total_chunks: u64,
    pub total_partials: u64,
    pub total_finals: u64,
    pub total_errors: u64,
}

/// Centralized session registry with lifecycle management.
///
/// Owns the live registry map and its lock, enforces per-instance and
/// global concurrency limits, runs the idle reaper, and aggregates
/// inspection data. Constructed once at process start and shared by
/// reference with every connection handler.
pub struct SessionManager {
    config: Config,
    endpoint_config: EndpointConfig,
    instance_id: String,
    engine: Arc<dyn SpeechEngine>,
    store: Arc<dyn SessionStore>,
    sessions: Arc<RwLock<HashMap<String, Arc<Session>>>>,
    reaper_handle: Mutex<Option<JoinHandle<()>>>,
    stop_tx: watch::Sender<bool>,
}

impl SessionManager {
    pub fn new(config: Config, engine: Arc<dyn SpeechEngine>, store: Arc<dyn SessionStore>) -> Self {
        let endpoint_config = EndpointConfig {
            sample_rate: config.audio.sample_rate,
            frame_ms: config.audio.frame_ms,
            vad_threshold: config.audio.vad_threshold,
            max_buffer_bytes: config.audio.max_buffer_bytes,
            endpointing_ms: config.stream.endpointing_ms as f64,
        };
        let (stop_tx, _) = watch::channel(false);

        Self {
            config,
            endpoint_config,
            instance_id: uuid::Uuid::new_v4().to_string(),
            engine,
            store,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            reaper_handle: Mutex::new(None),
            stop_tx,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Create and register a new session.
    ///
    /// The count/check/insert sequence runs under a single write lock so
    /// that concurrent creations cannot both slip past the limit. Nothing
    /// is allocated or registered when the limit check fails.
    pub async fn create_session(&self) -> Result<Arc<Session>> {
        let mut sessions = self.sessions.write().await;

        let max_global = self.config.limits.max_global_sessions;
        if max_global > 0 {
            let global_active = self
                .store
                .count_active()
                .await
                .map_err(|source| GatewayError::Store { source })?;
            if global_active >= max_global {
                return Err(GatewayError::SessionLimitExceeded { limit: max_global });
            }
        }

        let max_sessions = self.config.limits.max_sessions;
        let active = sessions.values().filter(|s| s.is_active()).count();
        if active >= max_sessions {
            return Err(GatewayError::SessionLimitExceeded {
                limit: max_sessions,
            });
        }

        let session = Arc::new(Session::new(
            &self.instance_id,
            &self.endpoint_config,
            Arc::clone(&self.engine),
            self.config.audio.bytes_per_ms(),
        ));
        sessions.insert(session.id().to_string(), Arc::clone(&session));

        let created = self
            .store
            .create(&session.record())
            .await
            .map_err(|source| GatewayError::Store { source });
        match created {
            Ok(true) => {}
            Ok(false) => {
                // Should be unreachable with random 128-bit ids.
                sessions.remove(session.id());
                return Err(GatewayError::Store {
                    source: anyhow::anyhow!("duplicate session id {} in store", session.id()),
                });
            }
            Err(e) => {
                sessions.remove(session.id());
                return Err(e);
            }
        }

        info!(
            "Created session {} (active: {})",
            session.id(),
            active + 1
        );
        Ok(session)
    }

    /// Look up a live session on this instance.
    pub async fn get_session(&self, session_id: &str) -> Result<Arc<Session>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| GatewayError::SessionNotFound {
                id: session_id.to_string(),
            })
    }

    /// Close and deregister a session. Returns false (without error) when
    /// the id is unknown; every termination path funnels through here.
    pub async fn close_session(&self, session_id: &str) -> bool {
        Self::remove_and_close(&self.sessions, &self.store, session_id).await
    }

    async fn remove_and_close(
        sessions: &RwLock<HashMap<String, Arc<Session>>>,
        store: &Arc<dyn SessionStore>,
        session_id: &str,
    ) -> bool {
        let session = {
            let mut sessions = sessions.write().await;
            sessions.remove(session_id)
        };

        let Some(session) = session else {
            return false;
        };

        session.close().await;
        if let Err(e) = store.delete(session_id).await {
            warn!("Failed to delete record for session {session_id}: {e}");
        }
        info!("Closed session {session_id}");
        true
    }

    /// Start the background idle reaper.
    pub fn start(&self) {
        let mut handle = self
            .reaper_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        if handle.is_some() {
            warn!("Session reaper already running");
            return;
        }

        let sessions = Arc::clone(&self.sessions);
        let store = Arc::clone(&self.store);
        let mut stop_rx = self.stop_tx.subscribe();
        let interval = self.config.limits.reap_interval();
        let idle_timeout = self.config.limits.idle_timeout();

        *handle = Some(tokio::spawn(async move {
            info!("Session reaper started (interval {interval:?})");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        Self::reap_pass(&sessions, &store, idle_timeout).await;
                    }
                }
            }
            info!("Session reaper stopped");
        }));
    }

    /// One reaper pass: close idle or already-closed sessions and refresh
    /// store records for the live ones. A failure on one session never
    /// aborts cleanup of the rest.
    pub async fn reap_idle_sessions(&self) {
        Self::reap_pass(
            &self.sessions,
            &self.store,
            self.config.limits.idle_timeout(),
        )
        .await;
    }

    async fn reap_pass(
        sessions: &RwLock<HashMap<String, Arc<Session>>>,
        store: &Arc<dyn SessionStore>,
        idle_timeout: std::time::Duration,
    ) {
        let mut to_close = Vec::new();
        let mut live = Vec::new();
        {
            let sessions = sessions.read().await;
            for (id, session) in sessions.iter() {
                if !session.is_active() {
                    // Defensive: a closed session still present in the
                    // registry gets swept out here.
                    to_close.push(id.clone());
                } else if session.idle_for() >= idle_timeout {
                    info!("Session {id} idle timeout");
                    to_close.push(id.clone());
                } else {
                    live.push(session.record());
                }
            }
        }

        let reaped = to_close.len();
        for id in to_close {
            Self::remove_and_close(sessions, store, &id).await;
        }

        for record in live {
            if let Err(e) = store.update(&record).await {
                warn!("Failed to refresh record for session {}: {e}", record.session_id);
            }
        }

        if reaped > 0 {
            info!("Reaped {reaped} idle sessions");
        }
    }

    /// Stop the reaper and close every registered session. No session
    /// object outlives the manager.
    pub async fn shutdown(&self) {
        self.stop_tx.send_replace(true);

        let handle = {
            let mut guard = self
                .reaper_handle
                .lock()
                .unwrap_or_else(|e| e.into_inner());
            guard.take()
        };
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Session reaper task panicked: {e}");
            }
        }

        let sessions: Vec<(String, Arc<Session>)> = {
            let mut guard = self.sessions.write().await;
            guard.drain().collect()
        };
        for (id, session) in sessions {
            session.close().await;
            if let Err(e) = self.store.delete(&id).await {
                warn!("Failed to delete record for session {id}: {e}");
            }
        }

        info!("Session manager stopped");
    }

    // Inspection methods

    /// Count of sessions in `Created`/`Active` on this instance.
    pub async fn active_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.values().filter(|s| s.is_active()).count()
    }

    pub async fn list_sessions(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        sessions.values().map(|s| s.info()).collect()
    }

    pub async fn aggregate_metrics(&self) -> AggregateMetrics {
        let sessions = self.sessions.read().await;

        let mut metrics = AggregateMetrics {
            active_sessions: 0,
            total_sessions: sessions.len(),
            total_audio_bytes: 0,
            total_audio_duration_ms: 0.0,
            total_chunks: 0,
            total_partials: 0,
            total_finals: 0,
            total_errors: 0,
        };

        for session in sessions.values() {
            if session.is_active() {
                metrics.active_sessions += 1;
            }
            let snapshot = session.metrics().snapshot();
            metrics.total_audio_bytes += snapshot.audio_bytes_received;
            metrics.total_chunks += snapshot.audio_chunks_received;
            metrics.total_partials += snapshot.partials_emitted;
            metrics.total_finals += snapshot.finals_emitted;
            metrics.total_errors += snapshot.errors_emitted;
        }
        metrics.total_audio_duration_ms =
            metrics.total_audio_bytes as f64 / self.config.audio.bytes_per_ms();

        metrics
    }
}
