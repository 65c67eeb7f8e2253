use super::metrics::MetricsSnapshot;
use super::session::SessionState;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Store-facing projection of a session: identity and coarse metadata,
/// visible across instances. The live audio buffer never leaves the
/// owning instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub state: SessionState,
    pub owner_id: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    pub metrics: MetricsSnapshot,
}

impl SessionRecord {
    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Created | SessionState::Active)
    }
}

/// Where session metadata lives: an in-process map for single-instance
/// deployments, or a shared NATS bucket for multi-instance deployments.
///
/// Implementations tolerate concurrent create/update/delete from multiple
/// instances; counts are best-effort under concurrent creation.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Register a new record. Returns false (without overwriting) when the
    /// id already exists.
    async fn create(&self, record: &SessionRecord) -> Result<bool>;

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>>;

    /// Replace an existing record. Returns false when the id is absent.
    async fn update(&self, record: &SessionRecord) -> Result<bool>;

    /// Remove a record. Returns false when the id was absent.
    async fn delete(&self, session_id: &str) -> Result<bool>;

    /// Count records whose state still counts toward concurrency limits.
    async fn count_active(&self) -> Result<usize>;

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<SessionRecord>>;
}

/// In-process store for single-instance deployments.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, SessionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn create(&self, record: &SessionRecord) -> Result<bool> {
        let mut records = self.records.write().await;
        if records.contains_key(&record.session_id) {
            return Ok(false);
        }
        records.insert(record.session_id.clone(), record.clone());
        Ok(true)
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        Ok(self.records.read().await.get(session_id).cloned())
    }

    async fn update(&self, record: &SessionRecord) -> Result<bool> {
        let mut records = self.records.write().await;
        match records.get_mut(&record.session_id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        Ok(self.records.write().await.remove(session_id).is_some())
    }

    async fn count_active(&self) -> Result<usize> {
        let records = self.records.read().await;
        Ok(records.values().filter(|r| r.is_active()).count())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<SessionRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect())
    }
}

/// Shared store backed by a NATS JetStream key-value bucket.
///
/// The bucket's `max_age` bounds record staleness: a crashed instance's
/// orphaned records disappear once their TTL lapses, even without an
/// explicit delete. The owning instance refreshes records for live
/// sessions on every reaper pass.
pub struct NatsKvStore {
    bucket: async_nats::jetstream::kv::Store,
}

impl NatsKvStore {
    pub async fn connect(url: &str, bucket: &str, ttl: Duration) -> Result<Self> {
        info!("Connecting to session store at {url}");

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;
        let jetstream = async_nats::jetstream::new(client);

        let bucket = jetstream
            .create_key_value(async_nats::jetstream::kv::Config {
                bucket: bucket.to_string(),
                max_age: ttl,
                ..Default::default()
            })
            .await
            .context("Failed to open session bucket")?;

        info!("Session store connected");
        Ok(Self { bucket })
    }

    fn encode(record: &SessionRecord) -> Result<Vec<u8>> {
        serde_json::to_vec(record).context("Failed to encode session record")
    }

    async fn load_all(&self) -> Result<Vec<SessionRecord>> {
        let mut keys = self
            .bucket
            .keys()
            .await
            .context("Failed to list session keys")?;

        let mut records = Vec::new();
        while let Some(key) = keys.next().await {
            let key = key.context("Failed to read session key")?;
            let Some(payload) = self
                .bucket
                .get(key.as_str())
                .await
                .context("Failed to read session record")?
            else {
                continue;
            };
            match serde_json::from_slice(&payload) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping undecodable session record {key}: {e}"),
            }
        }
        Ok(records)
    }
}

#[async_trait]
impl SessionStore for NatsKvStore {
    async fn create(&self, record: &SessionRecord) -> Result<bool> {
        // Best-effort existence check; ids are 128-bit random so a lost
        // race here duplicates nothing in practice.
        if self.get(&record.session_id).await?.is_some() {
            return Ok(false);
        }
        self.bucket
            .put(record.session_id.as_str(), Self::encode(record)?.into())
            .await
            .context("Failed to write session record")?;
        Ok(true)
    }

    async fn get(&self, session_id: &str) -> Result<Option<SessionRecord>> {
        let Some(payload) = self
            .bucket
            .get(session_id)
            .await
            .context("Failed to read session record")?
        else {
            return Ok(None);
        };
        let record =
            serde_json::from_slice(&payload).context("Failed to decode session record")?;
        Ok(Some(record))
    }

    async fn update(&self, record: &SessionRecord) -> Result<bool> {
        if self.get(&record.session_id).await?.is_none() {
            return Ok(false);
        }
        self.bucket
            .put(record.session_id.as_str(), Self::encode(record)?.into())
            .await
            .context("Failed to write session record")?;
        Ok(true)
    }

    async fn delete(&self, session_id: &str) -> Result<bool> {
        if self.get(session_id).await?.is_none() {
            return Ok(false);
        }
        self.bucket
            .delete(session_id)
            .await
            .context("Failed to delete session record")?;
        Ok(true)
    }

    async fn count_active(&self) -> Result<usize> {
        Ok(self.load_all().await?.iter().filter(|r| r.is_active()).count())
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<SessionRecord>> {
        let mut records = self.load_all().await?;
        records.retain(|r| r.owner_id == owner_id);
        Ok(records)
    }
}
