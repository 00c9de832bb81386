use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::types::{Session, Turn};
use crate::Result;

/// Manages conversation sessions with JSONL persistence.
///
/// Sessions are cached in memory after first load. The agent loop is the sole
/// mutator, so no internal locking is needed — share behind whatever owns the
/// loop, not behind an `Arc`.
pub struct SessionManager {
    dir: PathBuf,
    cache: HashMap<String, Session>,
}

impl SessionManager {
    pub fn new(dir: PathBuf) -> Self {
        let _ = std::fs::create_dir_all(&dir);
        Self {
            dir,
            cache: HashMap::new(),
        }
    }

    /// Open the default store under `~/.rotbot/sessions`.
    pub fn open_default() -> Self {
        Self::new(rotbot_core::paths::sessions_dir())
    }

    /// Get or load a session. Loads the durable log on first touch; unreadable
    /// lines are skipped so one corrupt record never loses a conversation.
    pub fn get(&mut self, key: &str) -> &Session {
        self.load_into_cache(key);
        &self.cache[key]
    }

    /// Append a turn to the cache and the durable per-key log.
    pub fn append(&mut self, key: &str, turn: Turn) -> Result<()> {
        self.load_into_cache(key);

        let path = self.session_path(key);
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;
        let line = serde_json::to_string(&turn)?;
        writeln!(file, "{line}")?;

        self.cache.get_mut(key).unwrap().history.push(turn);
        Ok(())
    }

    /// Atomically rewrite the durable log from the cached session state.
    /// Used after consolidation truncates the prefix.
    pub fn rewrite(&mut self, key: &str) -> Result<()> {
        self.load_into_cache(key);
        let session = &self.cache[key];

        let mut text = String::new();
        for turn in &session.history {
            text.push_str(&serde_json::to_string(turn)?);
            text.push('\n');
        }

        let path = self.session_path(key);
        let tmp = path.with_extension("jsonl.tmp");
        std::fs::write(&tmp, text)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Detach everything but the trailing `keep` turns, rewrite the durable
    /// log, and return the detached prefix (for consolidation).
    pub fn truncate_keep_tail(&mut self, key: &str, keep: usize) -> Result<Vec<Turn>> {
        self.load_into_cache(key);
        let session = self.cache.get_mut(key).unwrap();
        let len = session.history.len();
        if len <= keep {
            return Ok(Vec::new());
        }
        let detached: Vec<Turn> = session.history.drain(..len - keep).collect();
        debug!(key, detached = detached.len(), kept = keep, "session truncated");
        self.rewrite(key)?;
        Ok(detached)
    }

    /// Delete a session (reset) — cache entry and durable log.
    pub fn delete(&mut self, key: &str) -> Result<()> {
        let path = self.session_path(key);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        self.cache.remove(key);
        Ok(())
    }

    /// All session keys with a durable log, in directory order.
    pub fn list(&self) -> Vec<String> {
        let mut keys = Vec::new();
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return keys;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("jsonl") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(stem.to_string());
                }
            }
        }
        keys
    }

    fn load_into_cache(&mut self, key: &str) {
        if self.cache.contains_key(key) {
            return;
        }
        let mut session = Session::new(key);
        let path = self.session_path(key);
        if path.exists() {
            session.history = load_jsonl(&path);
        }
        self.cache.insert(key.to_string(), session);
    }

    fn session_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", safe_key(key)))
    }
}

/// File-system safe form of a session key: `:` and `/` become `_`.
pub fn safe_key(key: &str) -> String {
    key.replace([':', '/'], "_")
}

fn load_jsonl(path: &Path) -> Vec<Turn> {
    let Ok(text) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    let mut turns = Vec::new();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Turn>(line) {
            Ok(turn) => turns.push(turn),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable session line"),
        }
    }
    turns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn manager() -> (tempfile::TempDir, SessionManager) {
        let dir = tempfile::tempdir().unwrap();
        let mgr = SessionManager::new(dir.path().to_path_buf());
        (dir, mgr)
    }

    #[test]
    fn safe_key_sanitizes_separators() {
        assert_eq!(safe_key("telegram:12/34"), "telegram_12_34");
    }

    #[test]
    fn append_persists_and_reloads() {
        let (dir, mut mgr) = manager();
        mgr.append("cli:u", Turn::new(Role::User, "hello")).unwrap();
        mgr.append("cli:u", Turn::new(Role::Assistant, "hi there"))
            .unwrap();
        assert_eq!(mgr.get("cli:u").message_count(), 2);

        // A fresh manager must see the same history on disk.
        let mut fresh = SessionManager::new(dir.path().to_path_buf());
        let session = fresh.get("cli:u");
        assert_eq!(session.message_count(), 2);
        assert_eq!(session.history[1].content, "hi there");
    }

    #[test]
    fn disk_tail_matches_memory_tail_after_every_append() {
        let (dir, mut mgr) = manager();
        for i in 0..5 {
            mgr.append("cli:u", Turn::new(Role::User, format!("msg {i}")))
                .unwrap();
            let on_disk =
                std::fs::read_to_string(dir.path().join("cli_u.jsonl")).unwrap();
            let last_line = on_disk.lines().last().unwrap();
            let turn: Turn = serde_json::from_str(last_line).unwrap();
            assert_eq!(turn.content, mgr.get("cli:u").history.last().unwrap().content);
            assert_eq!(on_disk.lines().count(), mgr.get("cli:u").message_count());
        }
    }

    #[test]
    fn corrupt_lines_are_skipped_on_load() {
        let (dir, mut mgr) = manager();
        mgr.append("cli:u", Turn::new(Role::User, "good")).unwrap();
        let path = dir.path().join("cli_u.jsonl");
        let mut text = std::fs::read_to_string(&path).unwrap();
        text.push_str("{broken json\n");
        std::fs::write(&path, text).unwrap();
        mgr.append("cli:u", Turn::new(Role::User, "also good")).unwrap();

        let mut fresh = SessionManager::new(dir.path().to_path_buf());
        let session = fresh.get("cli:u");
        assert_eq!(session.message_count(), 2);
    }

    #[test]
    fn truncate_keeps_trailing_window_on_disk() {
        let (dir, mut mgr) = manager();
        for i in 0..8 {
            mgr.append("cli:u", Turn::new(Role::User, format!("turn {i}")))
                .unwrap();
        }
        let detached = mgr.truncate_keep_tail("cli:u", 3).unwrap();
        assert_eq!(detached.len(), 5);
        assert_eq!(detached[0].content, "turn 0");
        assert_eq!(mgr.get("cli:u").message_count(), 3);

        let mut fresh = SessionManager::new(dir.path().to_path_buf());
        let session = fresh.get("cli:u");
        assert_eq!(session.message_count(), 3);
        assert_eq!(session.history[0].content, "turn 5");
    }

    #[test]
    fn delete_removes_cache_and_file() {
        let (dir, mut mgr) = manager();
        mgr.append("cli:u", Turn::new(Role::User, "x")).unwrap();
        mgr.delete("cli:u").unwrap();
        assert!(!dir.path().join("cli_u.jsonl").exists());
        assert_eq!(mgr.get("cli:u").message_count(), 0);
    }

    #[test]
    fn list_returns_sanitized_keys() {
        let (_dir, mut mgr) = manager();
        mgr.append("telegram:42", Turn::new(Role::User, "x")).unwrap();
        let keys = mgr.list();
        assert_eq!(keys, vec!["telegram_42".to_string()]);
    }
}
