//! In-memory message bus — decouples channel adapters from the agent loop.
//!
//! Architecture:
//!   adapter → inbound queue → AgentLoop
//!   AgentLoop → outbound queue → ChannelManager → adapter
//!
//! Both queues are unbounded FIFOs. Exactly one consumer task is expected per
//! direction (the agent loop inbound, the channel manager outbound); producers
//! may be many. Nothing is persisted — a message in flight dies with the
//! process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tokio::time::Duration;

/// Seconds since the Unix epoch as a float, matching the session record format.
pub fn epoch_now() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// A user message received from a channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Logical channel name (e.g. "telegram", "discord", "cli").
    pub channel: String,
    /// Platform-native conversation identifier within that channel.
    pub chat_id: String,
    /// Platform-native sender identifier.
    pub user_id: String,
    /// Plain text content.
    pub content: String,
    /// Media descriptors (images, voice notes, …) — opaque to the core.
    #[serde(default)]
    pub media: Vec<serde_json::Value>,
    /// Platform-specific extras (usernames, display names, …).
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Arrival time, seconds since epoch.
    pub timestamp: f64,
}

impl InboundMessage {
    pub fn new(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
            user_id: user_id.into(),
            content: content.into(),
            media: Vec::new(),
            metadata: HashMap::new(),
            timestamp: epoch_now(),
        }
    }

    /// Identity of the conversation scope: `{channel}:{chat_id}`.
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.channel, self.chat_id)
    }
}

/// A complete response bound for a channel adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub channel: String,
    pub chat_id: String,
    pub content: String,
    /// Terminal flag — the router only delivers final messages.
    pub is_final: bool,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub timestamp: f64,
}

impl OutboundMessage {
    pub fn new(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
            content: content.into(),
            is_final: true,
            metadata: HashMap::new(),
            timestamp: epoch_now(),
        }
    }
}

/// An incremental piece of a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    pub channel: String,
    pub chat_id: String,
    /// The newly arrived delta.
    pub chunk: String,
    /// Full display text so far, including this delta.
    pub accumulated: String,
    pub is_final: bool,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Anything the agent loop can publish for delivery.
#[derive(Debug, Clone)]
pub enum OutboundEvent {
    Message(OutboundMessage),
    Chunk(StreamChunk),
}

impl OutboundEvent {
    pub fn channel(&self) -> &str {
        match self {
            OutboundEvent::Message(m) => &m.channel,
            OutboundEvent::Chunk(c) => &c.channel,
        }
    }
}

/// Async routing hub between channel adapters and the agent loop.
///
/// The receivers sit behind async mutexes so the bus itself can be shared via
/// `Arc`; contention is nil because each direction has a single consumer.
pub struct MessageBus {
    inbound_tx: mpsc::UnboundedSender<InboundMessage>,
    inbound_rx: Mutex<mpsc::UnboundedReceiver<InboundMessage>>,
    outbound_tx: mpsc::UnboundedSender<OutboundEvent>,
    outbound_rx: Mutex<mpsc::UnboundedReceiver<OutboundEvent>>,
    inbound_pending: AtomicUsize,
    outbound_pending: AtomicUsize,
    running: AtomicBool,
}

impl MessageBus {
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        Self {
            inbound_tx,
            inbound_rx: Mutex::new(inbound_rx),
            outbound_tx,
            outbound_rx: Mutex::new(outbound_rx),
            inbound_pending: AtomicUsize::new(0),
            outbound_pending: AtomicUsize::new(0),
            running: AtomicBool::new(true),
        }
    }

    /// A channel adapter publishes a user message.
    pub fn publish_inbound(&self, message: InboundMessage) {
        if self.inbound_tx.send(message).is_ok() {
            self.inbound_pending.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// The agent loop consumes the next inbound message, waiting up to
    /// `timeout`. Returns `None` on expiry or when the bus has been stopped.
    pub async fn consume_inbound(&self, timeout: Duration) -> Option<InboundMessage> {
        if !self.running.load(Ordering::SeqCst) {
            return None;
        }
        let mut rx = self.inbound_rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(msg)) => {
                self.inbound_pending.fetch_sub(1, Ordering::SeqCst);
                Some(msg)
            }
            _ => None,
        }
    }

    /// The agent loop publishes a response or stream chunk.
    pub fn publish_outbound(&self, event: OutboundEvent) {
        if self.outbound_tx.send(event).is_ok() {
            self.outbound_pending.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// The channel manager consumes the next outbound event.
    pub async fn consume_outbound(&self, timeout: Duration) -> Option<OutboundEvent> {
        if !self.running.load(Ordering::SeqCst) {
            return None;
        }
        let mut rx = self.outbound_rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(event)) => {
                self.outbound_pending.fetch_sub(1, Ordering::SeqCst);
                Some(event)
            }
            _ => None,
        }
    }

    /// Stop the bus — pending consumers return `None` at their next tick.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn inbound_pending(&self) -> usize {
        self.inbound_pending.load(Ordering::SeqCst)
    }

    pub fn outbound_pending(&self) -> usize {
        self.outbound_pending.load(Ordering::SeqCst)
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_key_joins_channel_and_chat() {
        let msg = InboundMessage::new("cli", "u1", "u1", "hello");
        assert_eq!(msg.session_key(), "cli:u1");
    }

    #[tokio::test]
    async fn inbound_round_trip_preserves_order() {
        let bus = MessageBus::new();
        bus.publish_inbound(InboundMessage::new("cli", "a", "a", "first"));
        bus.publish_inbound(InboundMessage::new("cli", "a", "a", "second"));
        assert_eq!(bus.inbound_pending(), 2);

        let m1 = bus.consume_inbound(Duration::from_millis(100)).await.unwrap();
        let m2 = bus.consume_inbound(Duration::from_millis(100)).await.unwrap();
        assert_eq!(m1.content, "first");
        assert_eq!(m2.content, "second");
        assert_eq!(bus.inbound_pending(), 0);
    }

    #[tokio::test]
    async fn consume_times_out_with_none() {
        let bus = MessageBus::new();
        let got = bus.consume_inbound(Duration::from_millis(20)).await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn stopped_bus_returns_none_immediately() {
        let bus = MessageBus::new();
        bus.publish_outbound(OutboundEvent::Message(OutboundMessage::new(
            "cli", "u", "text",
        )));
        bus.stop();
        let got = bus.consume_outbound(Duration::from_secs(5)).await;
        assert!(got.is_none());
    }

    #[tokio::test]
    async fn outbound_carries_both_variants() {
        let bus = MessageBus::new();
        bus.publish_outbound(OutboundEvent::Chunk(StreamChunk {
            channel: "cli".into(),
            chat_id: "u".into(),
            chunk: "he".into(),
            accumulated: "he".into(),
            is_final: false,
            metadata: HashMap::new(),
        }));
        bus.publish_outbound(OutboundEvent::Message(OutboundMessage::new(
            "cli", "u", "hello",
        )));

        match bus.consume_outbound(Duration::from_millis(100)).await {
            Some(OutboundEvent::Chunk(c)) => assert_eq!(c.chunk, "he"),
            other => panic!("expected chunk, got {other:?}"),
        }
        match bus.consume_outbound(Duration::from_millis(100)).await {
            Some(OutboundEvent::Message(m)) => {
                assert!(m.is_final);
                assert_eq!(m.content, "hello");
            }
            other => panic!("expected message, got {other:?}"),
        }
    }
}
