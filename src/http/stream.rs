//! WebSocket adapter for the streaming endpoint.
//!
//! Wraps the socket's split halves in the connection driver's transport
//! traits; all protocol behavior lives in `handler::run_connection`.

use super::state::AppState;
use crate::handler::{run_connection, MessageSource};
use crate::outbound::MessageSink;
use crate::wire::{ClientMessage, ServerMessage};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tracing::warn;

/// GET /v1/transcribe/stream
pub async fn stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sink, source) = socket.split();
    let result = run_connection(
        state.manager.clone(),
        WsSource { stream: source },
        WsSink { sink },
    )
    .await;

    if let Err(e) = result {
        warn!("Streaming connection ended with error: {e}");
    }
}

struct WsSource {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl MessageSource for WsSource {
    async fn recv(&mut self) -> Option<Result<ClientMessage>> {
        loop {
            return match self.stream.next().await? {
                Ok(Message::Text(text)) => Some(
                    serde_json::from_str(&text).map_err(|e| anyhow!("invalid message: {e}")),
                ),
                Ok(Message::Binary(_)) => Some(Err(anyhow!("binary frames not supported"))),
                Ok(Message::Close(_)) => None,
                // Ping/pong frames are answered by axum
                Ok(_) => continue,
                Err(_) => None,
            };
        }
    }
}

struct WsSink {
    sink: SplitSink<WebSocket, Message>,
}

#[async_trait]
impl MessageSink for WsSink {
    async fn send(&mut self, message: &ServerMessage) -> Result<()> {
        let text = serde_json::to_string(message).context("Failed to encode message")?;
        self.sink
            .send(Message::Text(text))
            .await
            .context("WebSocket send failed")
    }

    async fn close(&mut self, code: u16, reason: &str) -> Result<()> {
        let frame = CloseFrame {
            code,
            reason: reason.to_string().into(),
        };
        // The peer may already be gone; nothing to do about it here.
        let _ = self.sink.send(Message::Close(Some(frame))).await;
        Ok(())
    }
}
