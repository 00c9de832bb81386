use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::time::Duration;
use tracing::{error, info, warn};

use rotbot_core::bus::{MessageBus, OutboundEvent};

use crate::channel::Channel;

const BUS_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Owns the set of channel adapters and routes outbound artifacts to them.
///
/// Adapters never reference the manager back — they hold the bus only, so
/// there are no ownership cycles.
pub struct ChannelManager {
    bus: Arc<MessageBus>,
    channels: HashMap<String, Arc<dyn Channel>>,
    running: Arc<AtomicBool>,
}

impl ChannelManager {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self {
            bus,
            channels: HashMap::new(),
            running: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Register an adapter under its [`Channel::name`]. A duplicate name
    /// replaces the previous adapter.
    pub fn register(&mut self, channel: Arc<dyn Channel>) {
        let name = channel.name().to_string();
        info!(channel = %name, "registered channel");
        self.channels.insert(name, channel);
    }

    pub fn channel_names(&self) -> Vec<&str> {
        self.channels.keys().map(|s| s.as_str()).collect()
    }

    /// Start every adapter, then run the outbound routing loop until
    /// [`stop_all`](Self::stop_all).
    ///
    /// One adapter failing to start does not abort the others.
    pub async fn start_all(&self) {
        for (name, channel) in &self.channels {
            match channel.start().await {
                Ok(()) => info!(channel = %name, "channel started"),
                Err(e) => error!(channel = %name, error = %e, "failed to start channel"),
            }
        }
        self.route_outbound().await;
    }

    /// Idempotent: the routing loop exits at its next timeout tick, then
    /// every adapter is stopped.
    pub async fn stop_all(&self) {
        self.running.store(false, Ordering::SeqCst);
        for (name, channel) in &self.channels {
            channel.stop().await;
            info!(channel = %name, "channel stopped");
        }
    }

    /// Consume outbound events and dispatch each to the adapter named in it.
    async fn route_outbound(&self) {
        while self.running.load(Ordering::SeqCst) {
            let Some(event) = self.bus.consume_outbound(BUS_POLL_TIMEOUT).await else {
                continue;
            };

            let Some(channel) = self.channels.get(event.channel()) else {
                warn!(channel = %event.channel(), "no adapter for outbound event");
                continue;
            };

            let result = match &event {
                OutboundEvent::Chunk(chunk) => {
                    channel.send_stream_chunk(&chunk.chat_id, chunk).await
                }
                OutboundEvent::Message(msg) if msg.is_final => {
                    channel.send_message(&msg.chat_id, &msg.content).await
                }
                // Non-final outbound messages are streaming intermediates
                // already covered by StreamChunk.
                OutboundEvent::Message(_) => Ok(()),
            };

            if let Err(e) = result {
                error!(channel = %event.channel(), error = %e, "outbound delivery failed");
            }
        }
    }
}
