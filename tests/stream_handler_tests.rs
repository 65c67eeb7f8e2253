// Tests for the transport-agnostic connection driver, using scripted
// message sources and collecting sinks in place of a live socket.

use anyhow::{anyhow, Result};
use asr_gateway::config::Config;
use asr_gateway::engine::MockEngine;
use asr_gateway::handler::{run_connection, MessageSource};
use asr_gateway::outbound::MessageSink;
use asr_gateway::session::{MemoryStore, SessionManager};
use asr_gateway::wire::{close_code, ClientMessage, ErrorCode, ServerMessage};
use async_trait::async_trait;
use base64::Engine;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

const FRAME_BYTES: usize = 640;

fn manager(config: Config) -> Arc<SessionManager> {
    let engine = Arc::new(MockEngine::new(FRAME_BYTES, Duration::ZERO));
    Arc::new(SessionManager::new(
        config,
        engine,
        Arc::new(MemoryStore::new()),
    ))
}

fn speech_chunk() -> ClientMessage {
    let audio: Vec<u8> = [8000i16; FRAME_BYTES / 2]
        .iter()
        .flat_map(|s| s.to_le_bytes())
        .collect();
    ClientMessage::AudioChunk {
        data: base64::engine::general_purpose::STANDARD.encode(audio),
    }
}

struct ScriptedSource {
    messages: VecDeque<Result<ClientMessage>>,
}

impl ScriptedSource {
    fn new(messages: Vec<Result<ClientMessage>>) -> Self {
        Self {
            messages: messages.into(),
        }
    }
}

#[async_trait]
impl MessageSource for ScriptedSource {
    async fn recv(&mut self) -> Option<Result<ClientMessage>> {
        self.messages.pop_front()
    }
}

#[derive(Clone, Default)]
struct CollectSink {
    sent: Arc<Mutex<Vec<ServerMessage>>>,
    closed: Arc<Mutex<Option<(u16, String)>>>,
    stall: bool,
}

#[async_trait]
impl MessageSink for CollectSink {
    async fn send(&mut self, message: &ServerMessage) -> Result<()> {
        if self.stall {
            futures::future::pending::<()>().await;
        }
        self.sent.lock().await.push(message.clone());
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        *self.closed.lock().await = Some((code, reason.to_string()));
        Ok(())
    }
}

#[tokio::test]
async fn speech_stream_yields_partials_then_cleans_up() -> Result<()> {
    let manager = manager(Config::default());
    let source = ScriptedSource::new(vec![
        Ok(speech_chunk()),
        Ok(speech_chunk()),
        Ok(speech_chunk()),
        Ok(ClientMessage::Stop),
    ]);
    let sink = CollectSink::default();

    run_connection(Arc::clone(&manager), source, sink.clone()).await?;

    let sent = sink.sent.lock().await;
    assert!(matches!(sent[0], ServerMessage::SessionStart { .. }));
    let partials = sent
        .iter()
        .filter(|m| matches!(m, ServerMessage::Partial { text, .. } if !text.is_empty()))
        .count();
    assert_eq!(partials, 3);

    assert_eq!(manager.active_count().await, 0);
    assert_eq!(
        sink.closed.lock().await.as_ref().map(|(code, _)| *code),
        Some(close_code::NORMAL)
    );
    Ok(())
}

#[tokio::test]
async fn oversized_chunk_is_rejected_before_the_session() -> Result<()> {
    let mut config = Config::default();
    config.stream.max_chunk_bytes = 700;
    let manager = manager(config);

    let oversized = ClientMessage::AudioChunk {
        data: base64::engine::general_purpose::STANDARD.encode(vec![1u8; 1000]),
    };
    let source = ScriptedSource::new(vec![
        Ok(oversized),
        Ok(speech_chunk()),
        Ok(ClientMessage::Stop),
    ]);
    let sink = CollectSink::default();

    run_connection(Arc::clone(&manager), source, sink.clone()).await?;

    let sent = sink.sent.lock().await;
    assert!(matches!(
        sent[1],
        ServerMessage::Error {
            code: ErrorCode::ChunkTooLarge,
            ..
        }
    ));
    // The stream survives the rejection
    assert!(matches!(sent[2], ServerMessage::Partial { .. }));
    Ok(())
}

#[tokio::test]
async fn undecodable_audio_reports_invalid_audio() -> Result<()> {
    let manager = manager(Config::default());
    let source = ScriptedSource::new(vec![
        Ok(ClientMessage::AudioChunk {
            data: "not base64!!!".to_string(),
        }),
        Ok(ClientMessage::Stop),
    ]);
    let sink = CollectSink::default();

    run_connection(Arc::clone(&manager), source, sink.clone()).await?;

    let sent = sink.sent.lock().await;
    assert!(matches!(
        sent[1],
        ServerMessage::Error {
            code: ErrorCode::InvalidAudio,
            ..
        }
    ));
    Ok(())
}

#[tokio::test]
async fn malformed_message_reports_error_and_continues() -> Result<()> {
    let manager = manager(Config::default());
    let source = ScriptedSource::new(vec![
        Err(anyhow!("unknown message type: banana")),
        Ok(speech_chunk()),
        Ok(ClientMessage::Stop),
    ]);
    let sink = CollectSink::default();

    run_connection(Arc::clone(&manager), source, sink.clone()).await?;

    let sent = sink.sent.lock().await;
    assert!(matches!(
        sent[1],
        ServerMessage::Error {
            code: ErrorCode::InvalidAudio,
            ..
        }
    ));
    assert!(matches!(sent[2], ServerMessage::Partial { .. }));
    assert_eq!(manager.active_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn limit_rejection_closes_before_allocating() -> Result<()> {
    let mut config = Config::default();
    config.limits.max_sessions = 1;
    let manager = manager(config);
    manager.create_session().await?;

    let source = ScriptedSource::new(vec![Ok(speech_chunk())]);
    let sink = CollectSink::default();

    run_connection(Arc::clone(&manager), source, sink.clone()).await?;

    let sent = sink.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert!(matches!(
        sent[0],
        ServerMessage::Error {
            code: ErrorCode::SessionLimit,
            ..
        }
    ));
    assert_eq!(
        sink.closed.lock().await.as_ref().map(|(code, _)| *code),
        Some(close_code::POLICY_VIOLATION)
    );
    assert_eq!(manager.active_count().await, 1);
    Ok(())
}

#[tokio::test]
async fn transport_loss_runs_the_same_cleanup() -> Result<()> {
    let manager = manager(Config::default());
    // Source ends without a stop message, like an abrupt disconnect
    let source = ScriptedSource::new(vec![Ok(speech_chunk())]);
    let sink = CollectSink::default();

    run_connection(Arc::clone(&manager), source, sink.clone()).await?;

    assert_eq!(manager.active_count().await, 0);
    assert_eq!(manager.list_sessions().await.len(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn persistent_slowness_terminates_the_connection() -> Result<()> {
    let mut config = Config::default();
    config.stream.outbound_capacity = 1;
    config.stream.slow_client_threshold = 2;
    let manager = manager(config);

    // A sink that never completes a write: the queue backs up and every
    // further result is dropped until the slow-client threshold trips.
    let mut messages: Vec<Result<ClientMessage>> = Vec::new();
    for _ in 0..20 {
        messages.push(Ok(speech_chunk()));
    }
    let source = ScriptedSource::new(messages);
    let sink = CollectSink {
        stall: true,
        ..CollectSink::default()
    };

    run_connection(Arc::clone(&manager), source, sink.clone()).await?;

    assert_eq!(
        sink.closed.lock().await.as_ref().map(|(code, _)| *code),
        Some(close_code::POLICY_VIOLATION)
    );
    assert_eq!(manager.active_count().await, 0);
    Ok(())
}
