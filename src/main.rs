use anyhow::{Context, Result};
use asr_gateway::engine::MockEngine;
use asr_gateway::session::{MemoryStore, NatsKvStore, SessionManager, SessionStore};
use asr_gateway::{create_router, AppState, Config};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Streaming transcription session gateway
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// Path to a config file (defaults + ASR_* environment otherwise)
    #[arg(long)]
    config: Option<String>,

    /// Override the listen port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }

    info!("asr-gateway v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Limits: {} sessions/instance, idle timeout {}s",
        config.limits.max_sessions, config.limits.idle_timeout_secs
    );

    let engine = Arc::new(MockEngine::new(
        config.audio.bytes_per_word,
        Duration::from_millis(config.audio.engine_latency_ms),
    ));

    let store: Arc<dyn SessionStore> = match &config.store.url {
        Some(url) => {
            info!("Using shared session store at {url}");
            Arc::new(NatsKvStore::connect(url, &config.store.bucket, config.store.ttl()).await?)
        }
        None => {
            info!("Using in-process session store");
            Arc::new(MemoryStore::new())
        }
    };

    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let manager = Arc::new(SessionManager::new(config, engine, store));
    manager.start();

    let router = create_router(AppState::new(Arc::clone(&manager)));
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Listening on {addr}");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    manager.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
