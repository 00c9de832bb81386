//! Interactive terminal channel for `rotbot agent`.
//!
//! Streaming deltas print without newlines (line-stream profile); the final
//! message prints as a block. Turn completion is an explicit signal from the
//! final delivery rather than a polled streaming flag, so the input loop
//! knows exactly when to prompt again.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Notify;
use tokio::time::Duration;
use tracing::info;

use rotbot_core::bus::{InboundMessage, MessageBus, StreamChunk};

use crate::channel::{Channel, ChannelError};

/// Hard ceiling on waiting for a turn to finish.
const RESPONSE_TIMEOUT: Duration = Duration::from_secs(180);

const CHAT_ID: &str = "cli_user";

pub struct CliChannel {
    bus: Arc<MessageBus>,
    streaming: AtomicBool,
    turn_done: Notify,
    running: AtomicBool,
}

impl CliChannel {
    pub fn new(bus: Arc<MessageBus>) -> Self {
        Self {
            bus,
            streaming: AtomicBool::new(false),
            turn_done: Notify::new(),
            running: AtomicBool::new(true),
        }
    }

    /// Publish one user line to the bus.
    pub fn publish_line(&self, content: &str) {
        self.bus
            .publish_inbound(InboundMessage::new("cli", CHAT_ID, CHAT_ID, content));
    }

    /// Wait for the current turn's final message, up to the hard ceiling.
    pub async fn wait_for_turn(&self) {
        let _ = tokio::time::timeout(RESPONSE_TIMEOUT, self.turn_done.notified()).await;
    }

    /// Run the interactive input loop until EOF or an exit command.
    pub async fn run_interactive(&self) {
        println!("\nrotbot — multi-channel agent runtime");
        println!("Type 'exit' to quit, '/help' for commands\n");

        let stdin = BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();

        while self.running.load(Ordering::SeqCst) {
            print!("You: ");
            let _ = std::io::stdout().flush();

            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                _ => break, // EOF or read error
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if matches!(line.to_lowercase().as_str(), "exit" | "quit" | "/exit" | "/quit" | ":q") {
                break;
            }

            self.publish_line(line);
            self.wait_for_turn().await;
        }
        println!("\nGoodbye!");
    }
}

#[async_trait]
impl Channel for CliChannel {
    fn name(&self) -> &str {
        "cli"
    }

    async fn start(&self) -> Result<(), ChannelError> {
        info!("cli channel started");
        Ok(())
    }

    async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        // Release anyone stuck waiting on a turn.
        self.turn_done.notify_waiters();
    }

    async fn send_message(&self, _chat_id: &str, content: &str) -> Result<(), ChannelError> {
        if self.streaming.swap(false, Ordering::SeqCst) {
            println!();
        }
        println!("\n{content}\n");
        // notify_one stores a permit, so the signal is not lost if the
        // input loop has not started waiting yet.
        self.turn_done.notify_one();
        Ok(())
    }

    async fn send_stream_chunk(
        &self,
        _chat_id: &str,
        chunk: &StreamChunk,
    ) -> Result<(), ChannelError> {
        if chunk.is_final {
            if self.streaming.swap(false, Ordering::SeqCst) {
                println!();
            }
            return Ok(());
        }
        if !chunk.chunk.is_empty() {
            print!("{}", chunk.chunk);
            let _ = std::io::stdout().flush();
            self.streaming.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}
