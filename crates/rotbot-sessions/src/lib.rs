//! Conversation sessions with JSONL persistence — one file per
//! `channel:chat_id` conversation scope under `~/.rotbot/sessions/`.

mod store;
mod types;

pub use store::SessionManager;
pub use types::{Role, Session, Turn};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
