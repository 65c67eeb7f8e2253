use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

/// Gateway configuration.
///
/// Every key has a default and can be overridden through `ASR_`-prefixed
/// environment variables (nested keys use `__`, e.g.
/// `ASR_LIMITS__MAX_SESSIONS=500`), or through an optional config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub audio: AudioConfig,
    pub limits: LimitsConfig,
    pub stream: StreamConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8001,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate of incoming PCM audio (16-bit mono assumed)
    pub sample_rate: u32,

    /// VAD frame duration in milliseconds
    pub frame_ms: u32,

    /// Normalized RMS level above which a frame counts as speech
    pub vad_threshold: f32,

    /// Hard bound on the endpoint detector's frame buffer
    pub max_buffer_bytes: usize,

    /// Audio bytes per generated word for the mock engine
    pub bytes_per_word: usize,

    /// Simulated inference latency for the mock engine
    pub engine_latency_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            frame_ms: 20,
            vad_threshold: 0.01,
            max_buffer_bytes: 32 * 1024,
            bytes_per_word: 12800,
            engine_latency_ms: 50,
        }
    }
}

impl AudioConfig {
    /// PCM byte rate per millisecond (16-bit samples).
    pub fn bytes_per_ms(&self) -> f64 {
        (self.sample_rate as f64 * 2.0) / 1000.0
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum concurrent sessions on this instance
    pub max_sessions: usize,

    /// Maximum concurrent sessions across all instances (0 = unlimited)
    pub max_global_sessions: usize,

    /// Close sessions with no accepted audio for this long
    pub idle_timeout_secs: u64,

    /// Interval between reaper passes
    pub reap_interval_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1000,
            max_global_sessions: 0,
            idle_timeout_secs: 300,
            reap_interval_secs: 30,
        }
    }
}

impl LimitsConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Silence duration that ends an utterance
    pub endpointing_ms: u64,

    /// Reject audio chunks larger than this
    pub max_chunk_bytes: usize,

    /// Outbound queue capacity per connection
    pub outbound_capacity: usize,

    /// Consecutive dropped messages before a slow client is disconnected
    pub slow_client_threshold: u32,

    /// Per-message write timeout on the outbound path
    pub write_timeout_secs: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            endpointing_ms: 300,
            max_chunk_bytes: 1024 * 1024,
            outbound_capacity: 100,
            slow_client_threshold: 10,
            write_timeout_secs: 5,
        }
    }
}

impl StreamConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// NATS URL of the shared session store; absent means single-instance
    /// in-process mode
    pub url: Option<String>,

    /// JetStream key-value bucket holding session records
    pub bucket: String,

    /// Staleness bound after which orphaned records disappear
    pub ttl_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: None,
            bucket: "asr-sessions".to_string(),
            ttl_secs: 900,
        }
    }
}

impl StoreConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Config {
    /// Load configuration from defaults, an optional file, and the
    /// environment (highest precedence).
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("ASR")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
