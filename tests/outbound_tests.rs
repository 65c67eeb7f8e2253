// Tests for the bounded outbound channel: drop-on-full, slow-client
// escalation, and the drain task's write-timeout behavior.

use anyhow::Result;
use asr_gateway::outbound::{MessageSink, OutboundChannel};
use asr_gateway::wire::{close_code, ServerMessage};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Clone, Default)]
struct TestSink {
    sent: Arc<Mutex<Vec<ServerMessage>>>,
    closed: Arc<Mutex<Option<(u16, String)>>>,
    stall: bool,
}

#[async_trait]
impl MessageSink for TestSink {
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

fn partial(text: &str) -> ServerMessage {
    ServerMessage::partial(text)
}

#[tokio::test]
async fn enqueue_rejects_at_capacity_without_growing_the_queue() {
    let (outbound, receiver) = OutboundChannel::new(2, 10);

    assert!(outbound.enqueue(partial("one")));
    assert!(outbound.enqueue(partial("two")));
    assert!(!outbound.enqueue(partial("three")));

    let sink = TestSink::default();
    let drain = OutboundChannel::spawn_drain(
        receiver,
        sink.clone(),
        Duration::from_secs(5),
        outbound.termination_signal(),
    );
    drop(outbound);
    drain.await.unwrap();

    let sent = sink.sent.lock().await;
    assert_eq!(sent.len(), 2, "dropped message must not be delivered");
    assert_eq!(
        sink.closed.lock().await.as_ref().map(|(code, _)| *code),
        Some(close_code::NORMAL)
    );
}

#[tokio::test]
async fn drain_preserves_fifo_order() {
    let (outbound, receiver) = OutboundChannel::new(8, 10);
    for text in ["a", "b", "c"] {
        assert!(outbound.enqueue(partial(text)));
    }

    let sink = TestSink::default();
    let drain = OutboundChannel::spawn_drain(
        receiver,
        sink.clone(),
        Duration::from_secs(5),
        outbound.termination_signal(),
    );
    drop(outbound);
    drain.await.unwrap();

    let sent = sink.sent.lock().await;
    let texts: Vec<_> = sent
        .iter()
        .map(|m| match m {
            ServerMessage::Partial { text, .. } => text.clone(),
            other => panic!("unexpected message {other:?}"),
        })
        .collect();
    assert_eq!(texts, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn slow_client_signal_fires_exactly_once() {
    let (outbound, mut receiver) = OutboundChannel::new(1, 3);
    let mut signal = outbound.termination_signal();

    assert!(outbound.enqueue(partial("fills the queue")));
    for _ in 0..2 {
        assert!(!outbound.enqueue(partial("dropped")));
    }
    assert!(!*signal.borrow(), "signalled below the threshold");

    // Third consecutive rejection crosses the threshold
    assert!(!outbound.enqueue(partial("dropped")));
    assert!(signal.has_changed().unwrap());
    assert!(*signal.borrow_and_update());

    // Further rejections must not raise the signal again
    assert!(!outbound.enqueue(partial("dropped")));
    assert!(!signal.has_changed().unwrap());

    drop(receiver.recv().await);
}

#[tokio::test]
async fn successful_enqueue_resets_the_reject_counter() {
    let (outbound, mut receiver) = OutboundChannel::new(2, 3);
    let signal = outbound.termination_signal();

    assert!(outbound.enqueue(partial("one")));
    assert!(outbound.enqueue(partial("two")));
    assert!(!outbound.enqueue(partial("dropped")));
    assert!(!outbound.enqueue(partial("dropped")));

    // Make room; the next accepted message resets the streak
    receiver.recv().await.unwrap();
    assert!(outbound.enqueue(partial("three")));

    assert!(!outbound.enqueue(partial("dropped")));
    assert!(!outbound.enqueue(partial("dropped")));
    assert!(
        !*signal.borrow(),
        "non-consecutive rejections must not terminate"
    );
}

#[tokio::test(start_paused = true)]
async fn timed_out_writes_are_dropped_not_fatal() {
    let (outbound, receiver) = OutboundChannel::new(8, 10);
    assert!(outbound.enqueue(partial("stalled")));
    assert!(outbound.enqueue(partial("also stalled")));

    let sink = TestSink {
        stall: true,
        ..TestSink::default()
    };
    let drain = OutboundChannel::spawn_drain(
        receiver,
        sink.clone(),
        Duration::from_secs(5),
        outbound.termination_signal(),
    );
    drop(outbound);
    drain.await.unwrap();

    // Every write timed out; the drain survived and closed normally
    assert!(sink.sent.lock().await.is_empty());
    assert_eq!(
        sink.closed.lock().await.as_ref().map(|(code, _)| *code),
        Some(close_code::NORMAL)
    );
}

#[tokio::test]
async fn termination_closes_with_policy_violation() {
    let (outbound, receiver) = OutboundChannel::new(1, 1);

    assert!(outbound.enqueue(partial("fills the queue")));
    assert!(!outbound.enqueue(partial("dropped, crosses threshold")));

    let sink = TestSink::default();
    let drain = OutboundChannel::spawn_drain(
        receiver,
        sink.clone(),
        Duration::from_secs(5),
        outbound.termination_signal(),
    );
    drain.await.unwrap();

    assert_eq!(
        sink.closed.lock().await.as_ref().map(|(code, _)| *code),
        Some(close_code::POLICY_VIOLATION)
    );
    drop(outbound);
}
