use async_trait::async_trait;
use thiserror::Error;

use rotbot_core::bus::StreamChunk;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("send failed: {0}")]
    Send(String),

    #[error("channel not started")]
    NotStarted,
}

/// Common interface implemented by every channel adapter.
///
/// Each adapter converts platform events into inbound bus publishes and
/// delivers outbound artifacts handed to it by the
/// [`ChannelManager`](crate::ChannelManager). Implementations must be
/// `Send + Sync`; per-chat streaming state lives behind interior mutability
/// so the manager can drive adapters through a shared reference.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Stable lowercase identifier, unique across registered adapters.
    fn name(&self) -> &str;

    /// Bring up the platform connection and begin translating platform
    /// events into inbound bus publishes.
    async fn start(&self) -> Result<(), ChannelError>;

    /// Gracefully shut down the platform connection.
    async fn stop(&self);

    /// Deliver a complete message to a chat.
    async fn send_message(&self, chat_id: &str, content: &str) -> Result<(), ChannelError>;

    /// Handle one streaming chunk.
    ///
    /// Default is the replace-on-final profile: ignore intermediates and
    /// deliver the accumulated text when the terminal chunk arrives.
    /// Adapters on platforms with message editing override this with live
    /// edits.
    async fn send_stream_chunk(
        &self,
        chat_id: &str,
        chunk: &StreamChunk,
    ) -> Result<(), ChannelError> {
        if chunk.is_final && !chunk.accumulated.is_empty() {
            self.send_message(chat_id, &chunk.accumulated).await?;
        }
        Ok(())
    }
}
