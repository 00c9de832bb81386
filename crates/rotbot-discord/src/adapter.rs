//! Discord adapter.
//!
//! Inbound: a serenity gateway client publishes user messages to the bus.
//! Outbound: live-edit streaming with a 0.6 s edit interval and the 2000
//! character Discord message cap.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use serenity::builder::EditMessage;
use serenity::gateway::ShardManager;
use serenity::http::Http;
use serenity::model::channel::Message;
use serenity::model::gateway::{GatewayIntents, Ready};
use serenity::model::id::{ChannelId, MessageId, UserId};
use serenity::prelude::{Context, EventHandler};
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use rotbot_channels::{split_message, Channel, ChannelError};
use rotbot_core::access::AccessStore;
use rotbot_core::bus::{InboundMessage, MessageBus, StreamChunk};
use rotbot_core::config::DiscordChannelConfig;

const MESSAGE_LIMIT: usize = 2000;
const EDIT_INTERVAL: Duration = Duration::from_millis(600);
const CURSOR: &str = " ▌";

struct StreamState {
    message_id: MessageId,
    last_edit: Instant,
}

pub struct DiscordChannel {
    bus: Arc<MessageBus>,
    config: DiscordChannelConfig,
    access: Arc<AccessStore>,
    http: Mutex<Option<Arc<Http>>>,
    shards: Mutex<Option<Arc<ShardManager>>>,
    streams: DashMap<String, StreamState>,
    finalized: DashMap<String, ()>,
}

impl DiscordChannel {
    pub fn new(
        bus: Arc<MessageBus>,
        config: &DiscordChannelConfig,
        access: Arc<AccessStore>,
    ) -> Self {
        Self {
            bus,
            config: config.clone(),
            access,
            http: Mutex::new(None),
            shards: Mutex::new(None),
            streams: DashMap::new(),
            finalized: DashMap::new(),
        }
    }

    fn http(&self) -> Result<Arc<Http>, ChannelError> {
        self.http
            .lock()
            .unwrap()
            .clone()
            .ok_or(ChannelError::NotStarted)
    }

    fn parse_channel_id(chat_id: &str) -> Result<ChannelId, ChannelError> {
        chat_id
            .parse::<u64>()
            .map(ChannelId::new)
            .map_err(|_| ChannelError::Send(format!("invalid discord channel id: {chat_id}")))
    }
}

#[async_trait]
impl Channel for DiscordChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn start(&self) -> Result<(), ChannelError> {
        let intents = GatewayIntents::GUILD_MESSAGES
            | GatewayIntents::DIRECT_MESSAGES
            | GatewayIntents::MESSAGE_CONTENT;

        let handler = Handler {
            bus: Arc::clone(&self.bus),
            access: Arc::clone(&self.access),
            admin_id: self.config.admin_id,
        };

        let mut client = serenity::Client::builder(&self.config.token, intents)
            .event_handler(handler)
            .await
            .map_err(|e| ChannelError::Connection(e.to_string()))?;

        *self.http.lock().unwrap() = Some(Arc::clone(&client.http));
        *self.shards.lock().unwrap() = Some(Arc::clone(&client.shard_manager));

        tokio::spawn(async move {
            if let Err(e) = client.start().await {
                error!(error = %e, "discord client exited");
            }
        });
        Ok(())
    }

    async fn stop(&self) {
        let shards = self.shards.lock().unwrap().take();
        if let Some(shards) = shards {
            shards.shutdown_all().await;
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

        let http = self.http()?;
        let channel = Self::parse_channel_id(chat_id)?;
        for part in split_message(content, MESSAGE_LIMIT) {
            channel
                .say(http.as_ref(), part)
                .await
                .map_err(|e| ChannelError::Send(e.to_string()))?;
        }
        self.streams.remove(chat_id);
        Ok(())
    }

    async fn send_stream_chunk(
        &self,
        chat_id: &str,
        chunk: &StreamChunk,
    ) -> Result<(), ChannelError> {
        let http = self.http()?;
        let channel = Self::parse_channel_id(chat_id)?;

        if chunk.is_final {
            let Some((_, state)) = self.streams.remove(chat_id) else {
                return Ok(());
            };
            let final_text = chunk.accumulated.as_str();
            if final_text.chars().count() <= MESSAGE_LIMIT {
                let edit = EditMessage::new().content(final_text);
                if let Err(e) = channel
                    .edit_message(http.as_ref(), state.message_id, edit)
                    .await
                {
                    debug!(error = %e, "discord final edit failed");
                }
            } else {
                let _ = channel.delete_message(http.as_ref(), state.message_id).await;
                for part in split_message(final_text, MESSAGE_LIMIT) {
                    channel
                        .say(http.as_ref(), part)
                        .await
                        .map_err(|e| ChannelError::Send(e.to_string()))?;
                }
            }
            self.finalized.insert(chat_id.to_string(), ());
            return Ok(());
        }

        if chunk.accumulated.trim().is_empty() {
            return Ok(());
        }

        if let Some(state) = self.streams.get(chat_id) {
            if state.last_edit.elapsed() < EDIT_INTERVAL {
                return Ok(()); // rate limit
            }
        }

        let mut text = chunk.accumulated.clone();
        if text.chars().count() > MESSAGE_LIMIT {
            text = text.chars().take(MESSAGE_LIMIT - 3).collect::<String>() + "...";
        }
        text.push_str(CURSOR);

        match self.streams.get_mut(chat_id) {
            Some(mut state) => {
                let edit = EditMessage::new().content(text.as_str());
                match channel
                    .edit_message(http.as_ref(), state.message_id, edit)
                    .await
                {
                    Ok(_) => state.last_edit = Instant::now(),
                    Err(e) => debug!(error = %e, "discord edit failed"),
                }
            }
            None => match channel.say(http.as_ref(), text.as_str()).await {
                Ok(sent) => {
                    self.streams.insert(
                        chat_id.to_string(),
                        StreamState {
                            message_id: sent.id,
                            last_edit: Instant::now(),
                        },
                    );
                }
                Err(e) => debug!(error = %e, "discord initial stream send failed"),
            },
        }
        Ok(())
    }
}

struct Handler {
    bus: Arc<MessageBus>,
    access: Arc<AccessStore>,
    admin_id: u64,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!(user = %ready.user.name, "discord connected");
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        let content = msg.content.trim();
        if content.is_empty() {
            return;
        }

        let user_id = msg.author.id.get().to_string();
        let is_admin = self.admin_id != 0 && msg.author.id == UserId::new(self.admin_id);

        if self.admin_id != 0 && !is_admin && !self.access.is_approved("discord", &user_id) {
            if !self.access.is_pending("discord", &user_id) {
                let mut info = rotbot_core::access::UserInfo::new();
                info.insert(
                    "username".to_string(),
                    serde_json::Value::String(msg.author.name.clone()),
                );
                if let Err(e) = self.access.add_pending("discord", &user_id, info) {
                    warn!(error = %e, "failed to record pending user");
                }
            }
            let _ = msg
                .channel_id
                .say(&ctx.http, "Your access request is pending approval.")
                .await;
            return;
        }

        let mut inbound = InboundMessage::new(
            "discord",
            msg.channel_id.get().to_string(),
            user_id,
            content,
        );
        inbound.metadata.insert(
            "author_name".to_string(),
            serde_json::Value::String(msg.author.name.clone()),
        );
        self.bus.publish_inbound(inbound);
    }
}
