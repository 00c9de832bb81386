use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use rotbot_core::bus::epoch_now;

/// Speaker of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

/// One dialog entry. Serialized as one JSON line in the session file,
/// so unknown fields written by older builds survive a round trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Seconds since epoch.
    pub timestamp: f64,
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: epoch_now(),
            extra: HashMap::new(),
        }
    }
}

/// A conversation session for a specific `channel:chat_id` pair.
///
/// Append-only in normal operation; consolidation may truncate the prefix
/// via [`SessionManager::truncate_keep_tail`](crate::SessionManager).
#[derive(Debug, Clone)]
pub struct Session {
    pub key: String,
    pub history: Vec<Turn>,
}

impl Session {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            history: Vec::new(),
        }
    }

    /// The trailing `n` turns.
    pub fn recent(&self, n: usize) -> &[Turn] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    pub fn message_count(&self) -> usize {
        self.history.len()
    }
}
