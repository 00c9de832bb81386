//! Telegram adapter.
//!
//! Inbound: a teloxide long-polling dispatcher publishes user messages to
//! the bus. Outbound: the live-edit streaming profile — a placeholder
//! message is sent on the first chunk and edited in place, rate-limited to
//! one edit per second; the terminal chunk finalizes it without the cursor.
//!
//! Telegram's message limit is 4096 characters; 4000 leaves headroom for
//! the cursor glyph and Markdown escapes.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use teloxide::dispatching::ShutdownToken;
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode};
use tokio::time::Duration;
use tracing::{debug, info, warn};

use rotbot_channels::{split_message, Channel, ChannelError};
use rotbot_core::access::AccessStore;
use rotbot_core::bus::{InboundMessage, MessageBus, StreamChunk};
use rotbot_core::config::TelegramChannelConfig;

const MESSAGE_LIMIT: usize = 4000;
const EDIT_INTERVAL: Duration = Duration::from_secs(1);
const CURSOR: &str = " ▌";
/// Pause between consecutive split sends, to stay clear of rate limits.
const CHUNK_DELAY: Duration = Duration::from_millis(100);

struct StreamState {
    message_id: MessageId,
    last_edit: Instant,
}

pub struct TelegramChannel {
    bus: Arc<MessageBus>,
    bot: Bot,
    config: TelegramChannelConfig,
    access: Arc<AccessStore>,
    /// Per-chat live-edit state, created on the first chunk of a turn.
    streams: DashMap<String, StreamState>,
    /// Chats whose current turn was already rendered via the terminal
    /// chunk — the duplicate final OutboundMessage is skipped.
    finalized: DashMap<String, ()>,
    shutdown: Mutex<Option<ShutdownToken>>,
}

impl TelegramChannel {
    pub fn new(
        bus: Arc<MessageBus>,
        config: &TelegramChannelConfig,
        access: Arc<AccessStore>,
    ) -> Self {
        Self {
            bus,
            bot: Bot::new(&config.token),
            config: config.clone(),
            access,
            streams: DashMap::new(),
            finalized: DashMap::new(),
            shutdown: Mutex::new(None),
        }
    }

    /// Send `text` in Markdown, falling back to plain text when Telegram
    /// rejects the parse mode.
    async fn send_with_fallback(&self, chat_id: ChatId, text: &str) -> Result<(), ChannelError> {
        let sent = self
            .bot
            .send_message(chat_id, text)
            .parse_mode(ParseMode::Markdown)
            .await;
        if sent.is_ok() {
            return Ok(());
        }
        self.bot
            .send_message(chat_id, text)
            .await
            .map(|_| ())
            .map_err(|e| ChannelError::Send(e.to_string()))
    }

    fn parse_chat_id(chat_id: &str) -> Result<ChatId, ChannelError> {
        chat_id
            .parse::<i64>()
            .map(ChatId)
            .map_err(|_| ChannelError::Send(format!("invalid telegram chat id: {chat_id}")))
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<(), ChannelError> {
        let ctx = Arc::new(InboundCtx {
            bus: Arc::clone(&self.bus),
            access: Arc::clone(&self.access),
            admin_id: self.config.admin_id,
        });

        let handler = Update::filter_message().endpoint(handle_update);
        let mut dispatcher = Dispatcher::builder(self.bot.clone(), handler)
            .dependencies(dptree::deps![ctx])
            .default_handler(|_| async {})
            .build();

        *self.shutdown.lock().unwrap() = Some(dispatcher.shutdown_token());

        tokio::spawn(async move {
            info!("telegram: starting long-polling dispatcher");
            dispatcher.dispatch().await;
            info!("telegram: dispatcher exited");
        });
        Ok(())
    }

    async fn stop(&self) {
        let token = self.shutdown.lock().unwrap().take();
        if let Some(token) = token {
            if let Ok(fut) = token.shutdown() {
                fut.await;
            }
        }
    }

    async fn send_message(&self, chat_id: &str, content: &str) -> Result<(), ChannelError> {
        // The terminal chunk already rendered this turn via live edit.
        if self.finalized.remove(chat_id).is_some() {
            return Ok(());
        }
        if content.trim().is_empty() {
            return Ok(());
        }

        let id = Self::parse_chat_id(chat_id)?;
        let parts = split_message(content, MESSAGE_LIMIT);
        let count = parts.len();
        for (i, part) in parts.iter().enumerate() {
            self.send_with_fallback(id, part).await?;
            if i + 1 < count {
                tokio::time::sleep(CHUNK_DELAY).await;
            }
        }
        self.streams.remove(chat_id);
        Ok(())
    }

    async fn send_stream_chunk(
        &self,
        chat_id: &str,
        chunk: &StreamChunk,
    ) -> Result<(), ChannelError> {
        let id = Self::parse_chat_id(chat_id)?;

        if chunk.is_final {
            let Some((_, state)) = self.streams.remove(chat_id) else {
                // Nothing was streamed (command reply, warning) — the final
                // OutboundMessage will deliver it.
                return Ok(());
            };
            let final_text = chunk.accumulated.as_str();
            if final_text.chars().count() <= MESSAGE_LIMIT {
                let edited = self
                    .bot
                    .edit_message_text(id, state.message_id, final_text)
                    .parse_mode(ParseMode::Markdown)
                    .await;
                if edited.is_err() {
                    let _ = self
                        .bot
                        .edit_message_text(id, state.message_id, final_text)
                        .await;
                }
            } else {
                // Too long to live in one message: replace the preview with
                // newline-preferred splits.
                let _ = self.bot.delete_message(id, state.message_id).await;
                for part in split_message(final_text, MESSAGE_LIMIT) {
                    self.send_with_fallback(id, &part).await?;
                    tokio::time::sleep(CHUNK_DELAY).await;
                }
            }
            self.finalized.insert(chat_id.to_string(), ());
            return Ok(());
        }

        if chunk.accumulated.trim().is_empty() {
            return Ok(());
        }

        // Rate limit: drop updates arriving inside the edit interval.
        if let Some(state) = self.streams.get(chat_id) {
            if state.last_edit.elapsed() < EDIT_INTERVAL {
                return Ok(());
            }
        }

        let mut text: String = chunk.accumulated.clone();
        if text.chars().count() > MESSAGE_LIMIT {
            text = text.chars().take(MESSAGE_LIMIT - 3).collect::<String>() + "...";
        }
        text.push_str(CURSOR);

        match self.streams.get_mut(chat_id) {
            Some(mut state) => {
                match self
                    .bot
                    .edit_message_text(id, state.message_id, text.as_str())
                    .await
                {
                    Ok(_) => state.last_edit = Instant::now(),
                    Err(e) => debug!(error = %e, "telegram edit failed"),
                }
            }
            None => match self.bot.send_message(id, text.as_str()).await {
                Ok(sent) => {
                    self.streams.insert(
                        chat_id.to_string(),
                        StreamState {
                            message_id: sent.id,
                            last_edit: Instant::now(),
                        },
                    );
                }
                Err(e) => debug!(error = %e, "telegram initial stream send failed"),
            },
        }
        Ok(())
    }
}

struct InboundCtx {
    bus: Arc<MessageBus>,
    access: Arc<AccessStore>,
    admin_id: i64,
}

/// Dispatcher endpoint: normalize one Telegram message onto the bus.
async fn handle_update(bot: Bot, msg: Message, ctx: Arc<InboundCtx>) -> ResponseResult<()> {
    // Ignore other bots.
    if msg.from.as_ref().map(|u| u.is_bot).unwrap_or(false) {
        return Ok(());
    }
    let Some(from) = msg.from.as_ref() else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if text.is_empty() {
        return Ok(());
    }

    let user_id = from.id.0.to_string();
    let is_admin = ctx.admin_id != 0 && from.id.0 as i64 == ctx.admin_id;

    // Admin-gated access: unapproved users go to the pending queue.
    if ctx.admin_id != 0 && !is_admin && !ctx.access.is_approved("telegram", &user_id) {
        if !ctx.access.is_pending("telegram", &user_id) {
            let mut info = rotbot_core::access::UserInfo::new();
            if let Some(username) = &from.username {
                info.insert(
                    "username".to_string(),
                    serde_json::Value::String(username.clone()),
                );
            }
            if let Err(e) = ctx.access.add_pending("telegram", &user_id, info) {
                warn!(error = %e, "failed to record pending user");
            }
            let _ = bot
                .send_message(
                    ChatId(ctx.admin_id),
                    format!("Access request from Telegram user {user_id}."),
                )
                .await;
        }
        let _ = bot
            .send_message(msg.chat.id, "Your access request is pending approval.")
            .await;
        return Ok(());
    }

    let mut inbound = InboundMessage::new("telegram", msg.chat.id.to_string(), user_id, text);
    if let Some(username) = &from.username {
        inbound.metadata.insert(
            "username".to_string(),
            serde_json::Value::String(username.clone()),
        );
    }
    ctx.bus.publish_inbound(inbound);
    Ok(())
}
