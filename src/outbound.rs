//! Backpressure-aware outbound message path
//!
//! Decouples result production from slow network writes: a bounded queue
//! per connection, a drain task performing the actual writes, and
//! slow-client tracking that escalates persistent overload to a forced
//! disconnect instead of buffering without bound.

use crate::wire::{close_code, ServerMessage};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Write side of one connection's transport.
///
/// The drain task is the only writer; implementations adapt a concrete
/// transport (WebSocket, test collector) to this seam.
#[async_trait]
pub trait MessageSink: Send {
    async fn send(&mut self, message: &ServerMessage) -> Result<()>;

    /// Close the transport with a close code and reason.
    async fn close(&mut self, code: u16, reason: &str) -> Result<()>;
}

/// Bounded, per-connection queue between result production and the
/// network write path.
///
/// `enqueue` never blocks: at capacity the message is dropped and the
/// consecutive-drop counter rises. Once it reaches the slow-client
/// threshold the channel raises its termination signal exactly once; the
/// connection handler must act on it by closing the connection.
pub struct OutboundChannel {
    tx: mpsc::Sender<ServerMessage>,
    consecutive_rejects: AtomicU32,
    slow_threshold: u32,
    terminated: AtomicBool,
    terminate_tx: watch::Sender<bool>,
}

impl OutboundChannel {
    pub fn new(capacity: usize, slow_threshold: u32) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (terminate_tx, _) = watch::channel(false);
        (
            Self {
                tx,
                consecutive_rejects: AtomicU32::new(0),
                slow_threshold: slow_threshold.max(1),
                terminated: AtomicBool::new(false),
                terminate_tx,
            },
            rx,
        )
    }

    /// Offer a message to the queue. Returns false when the message was
    /// dropped (queue full or consumer gone).
    pub fn enqueue(&self, message: ServerMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => {
                self.consecutive_rejects.store(0, Ordering::SeqCst);
                true
            }
            Err(TrySendError::Full(message)) => {
                let rejects = self.consecutive_rejects.fetch_add(1, Ordering::SeqCst) + 1;
                debug!(
                    "Outbound queue full, dropping {} message ({rejects} consecutive)",
                    message.kind()
                );
                if rejects >= self.slow_threshold && !self.terminated.swap(true, Ordering::SeqCst) {
                    warn!("Slow client: {rejects} consecutive dropped messages, terminating");
                    self.terminate_tx.send_replace(true);
                }
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Watch for the slow-client termination signal.
    pub fn termination_signal(&self) -> watch::Receiver<bool> {
        self.terminate_tx.subscribe()
    }

    /// Spawn the drain task: FIFO delivery through the sink with a
    /// per-write timeout, closing the transport on termination or once
    /// the queue is closed and empty.
    pub fn spawn_drain<S>(
        mut receiver: mpsc::Receiver<ServerMessage>,
        mut sink: S,
        write_timeout: Duration,
        mut terminate: watch::Receiver<bool>,
    ) -> JoinHandle<()>
    where
        S: MessageSink + 'static,
    {
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    terminated = async { terminate.wait_for(|t| *t).await.is_ok() } => {
                        if terminated {
                            let _ = sink.close(close_code::POLICY_VIOLATION, "slow consumer").await;
                            return;
                        }
                        // Producer dropped without signalling: deliver what
                        // is left, then close normally.
                        while let Some(message) = receiver.recv().await {
                            if !deliver(&mut sink, message, write_timeout).await {
                                return;
                            }
                        }
                        let _ = sink.close(close_code::NORMAL, "").await;
                        return;
                    }
                    message = receiver.recv() => match message {
                        Some(message) => {
                            if !deliver(&mut sink, message, write_timeout).await {
                                return;
                            }
                        }
                        None => {
                            let _ = sink.close(close_code::NORMAL, "").await;
                            return;
                        }
                    },
                }
            }
        })
    }
}

/// Write one message with a timeout. A timed-out write is a dropped
/// message, not a fatal error; a transport failure stops the drain.
async fn deliver<S: MessageSink>(
    sink: &mut S,
    message: ServerMessage,
    write_timeout: Duration,
) -> bool {
    match tokio::time::timeout(write_timeout, sink.send(&message)).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!("Outbound write failed: {e}");
            false
        }
        Err(_) => {
            warn!(
                "Outbound write timed out after {write_timeout:?}, dropping {} message",
                message.kind()
            );
            true
        }
    }
}
