//! Transport-agnostic connection driver
//!
//! The transport layer hands a decoded message stream (`MessageSource`)
//! and a write path (`MessageSink`) to `run_connection`, which owns the
//! session for the lifetime of the connection. Stop requests, transport
//! loss, and slow-client termination all funnel through the same cleanup.

use crate::error::GatewayError;
use crate::outbound::{MessageSink, OutboundChannel};
use crate::session::SessionManager;
use crate::wire::{close_code, ClientMessage, ErrorCode, ServerMessage};
use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Read side of one connection's transport.
///
/// `None` means the transport is gone; `Some(Err(_))` is a decodable
/// transport frame carrying an unparseable message (reported to the
/// client, stream continues).
#[async_trait]
pub trait MessageSource: Send {
    async fn recv(&mut self) -> Option<Result<ClientMessage>>;
}

/// Drive one connection to completion.
pub async fn run_connection<S, K>(
    manager: Arc<SessionManager>,
    mut source: S,
    mut sink: K,
) -> Result<()>
where
    S: MessageSource,
    K: MessageSink + 'static,
{
    let stream_config = manager.config().stream.clone();

    // Reject before allocating anything else for this connection.
    let session = match manager.create_session().await {
        Ok(session) => session,
        Err(e @ GatewayError::SessionLimitExceeded { .. }) => {
            warn!("Rejecting connection: {e}");
            let _ = sink
                .send(&ServerMessage::error(ErrorCode::SessionLimit, e.to_string()))
                .await;
            let _ = sink
                .close(close_code::POLICY_VIOLATION, "session limit reached")
                .await;
            return Ok(());
        }
        Err(e) => {
            error!("Failed to create session: {e}");
            let _ = sink.close(close_code::INTERNAL_ERROR, "internal error").await;
            return Err(e.into());
        }
    };
    let session_id = session.id().to_string();
    info!("Connection established for session {session_id}");

    let (outbound, receiver) = OutboundChannel::new(
        stream_config.outbound_capacity,
        stream_config.slow_client_threshold,
    );
    let mut terminate = outbound.termination_signal();
    let drain = OutboundChannel::spawn_drain(
        receiver,
        sink,
        stream_config.write_timeout(),
        outbound.termination_signal(),
    );

    outbound.enqueue(ServerMessage::session_start(&session_id));

    loop {
        tokio::select! {
            terminated = async { terminate.wait_for(|t| *t).await.is_ok() } => {
                if terminated {
                    warn!("Terminating slow client on session {session_id}");
                }
                break;
            }
            incoming = source.recv() => match incoming {
                None => {
                    info!("Transport closed for session {session_id}");
                    break;
                }
                Some(Err(e)) => {
                    session.metrics().record_error();
                    outbound.enqueue(ServerMessage::error(
                        ErrorCode::InvalidAudio,
                        format!("invalid message: {e}"),
                    ));
                }
                Some(Ok(ClientMessage::Stop)) => {
                    info!("Stop requested on session {session_id}");
                    break;
                }
                Some(Ok(ClientMessage::AudioChunk { data })) => {
                    if !handle_audio_chunk(&session, &outbound, &stream_config, &data).await {
                        break;
                    }
                }
            }
        }
    }

    manager.close_session(&session_id).await;
    drop(outbound);
    let _ = drain.await;
    Ok(())
}

/// Validate and process one audio chunk. Returns false when the
/// connection should end.
async fn handle_audio_chunk(
    session: &Arc<crate::session::Session>,
    outbound: &OutboundChannel,
    stream_config: &crate::config::StreamConfig,
    data: &str,
) -> bool {
    let audio = match base64::engine::general_purpose::STANDARD.decode(data) {
        Ok(audio) => audio,
        Err(e) => {
            session.metrics().record_error();
            outbound.enqueue(ServerMessage::error(
                ErrorCode::InvalidAudio,
                format!("invalid base64 audio data: {e}"),
            ));
            return true;
        }
    };

    // Oversized input is rejected here, before it can touch the session.
    if audio.len() > stream_config.max_chunk_bytes {
        session.metrics().record_error();
        outbound.enqueue(ServerMessage::error(
            ErrorCode::ChunkTooLarge,
            format!(
                "audio chunk of {} bytes exceeds maximum of {}",
                audio.len(),
                stream_config.max_chunk_bytes
            ),
        ));
        return true;
    }

    if audio.is_empty() {
        return true;
    }

    match session.process_chunk(&audio).await {
        Ok(result) if result.is_final => {
            outbound.enqueue(ServerMessage::final_marker());
            true
        }
        Ok(result) => {
            outbound.enqueue(ServerMessage::partial(result.text));
            true
        }
        Err(e @ GatewayError::SessionClosing { .. }) => {
            session.metrics().record_error();
            outbound.enqueue(ServerMessage::error(ErrorCode::SessionClosing, e.to_string()));
            false
        }
        Err(e) => {
            error!("Failed to process chunk on session {}: {e}", session.id());
            false
        }
    }
}
