use std::io::Write;
use std::path::PathBuf;

use tracing::{debug, warn};

use rotbot_providers::{ChatMessage, ChatRequest, LlmProvider};
use rotbot_sessions::Turn;

/// Fewer turns than this are not worth a summarization call.
const MIN_TURNS_TO_CONSOLIDATE: usize = 5;

const SUMMARIZER_DIRECTIVE: &str = "Summarize the key facts, preferences, and important information \
from this conversation. Be concise. Use bullet points. \
Focus on what would be useful to remember for future conversations.";

/// Three-tier memory: session history → HISTORY.md → MEMORY.md.
///
/// - `HISTORY.md` — append-only searchable log of all interactions,
///   never rewritten.
/// - `MEMORY.md` — consolidated long-term facts, appended to by the
///   consolidator in dated sections.
/// - `YYYY-MM-DD.md` — daily notes.
pub struct MemoryStore {
    dir: PathBuf,
    memory_file: PathBuf,
    history_file: PathBuf,
}

impl MemoryStore {
    pub fn new(dir: PathBuf) -> Self {
        let _ = std::fs::create_dir_all(&dir);
        let store = Self {
            memory_file: dir.join("MEMORY.md"),
            history_file: dir.join("HISTORY.md"),
            dir,
        };
        store.init_files();
        store
    }

    pub fn open_default() -> Self {
        Self::new(rotbot_core::paths::memory_dir())
    }

    fn init_files(&self) {
        if !self.memory_file.exists() {
            let _ = std::fs::write(
                &self.memory_file,
                "# rotbot Memory\n\nLong-term facts and knowledge consolidated from conversations.\n\n",
            );
        }
        if !self.history_file.exists() {
            let _ = std::fs::write(
                &self.history_file,
                "# rotbot History\n\nSearchable log of recent interactions.\n\n",
            );
        }
    }

    /// Append one timestamped line to HISTORY.md.
    pub fn append_history(&self, channel: &str, user_id: &str, role: &str, content: &str) {
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let entry = format!("[{timestamp}] [{channel}:{user_id}] {role}: {content}\n");
        if let Err(e) = append_to(&self.history_file, &entry) {
            warn!(error = %e, "failed to append history line");
        }
    }

    /// Full contents of MEMORY.md, or empty when unreadable.
    pub fn read_memory(&self) -> String {
        std::fs::read_to_string(&self.memory_file).unwrap_or_default()
    }

    /// The last `last_n` lines of HISTORY.md.
    pub fn read_history(&self, last_n: usize) -> String {
        let Ok(text) = std::fs::read_to_string(&self.history_file) else {
            return String::new();
        };
        let lines: Vec<&str> = text.lines().collect();
        let start = lines.len().saturating_sub(last_n);
        lines[start..].join("\n")
    }

    /// Grep-like search through HISTORY.md — the trailing 20 case-insensitive
    /// substring matches.
    pub fn search_history(&self, query: &str) -> Vec<String> {
        let Ok(text) = std::fs::read_to_string(&self.history_file) else {
            return Vec::new();
        };
        let needle = query.to_lowercase();
        let matches: Vec<String> = text
            .lines()
            .filter(|line| line.to_lowercase().contains(&needle))
            .map(|line| line.trim().to_string())
            .collect();
        let start = matches.len().saturating_sub(20);
        matches[start..].to_vec()
    }

    /// Append a dated fact section to MEMORY.md.
    pub fn save_fact(&self, fact: &str) {
        let date = chrono::Local::now().format("%Y-%m-%d");
        let entry = format!("\n## {date}\n{fact}\n");
        if let Err(e) = append_to(&self.memory_file, &entry) {
            warn!(error = %e, "failed to save memory fact");
        }
    }

    /// Append to today's daily note, creating it with a heading if missing.
    pub fn append_daily_note(&self, content: &str) {
        let date = chrono::Local::now().format("%Y-%m-%d").to_string();
        let path = self.dir.join(format!("{date}.md"));
        if !path.exists() {
            let _ = std::fs::write(&path, format!("# {date}\n\n"));
        }
        if let Err(e) = append_to(&path, &format!("{content}\n")) {
            warn!(error = %e, "failed to append daily note");
        }
    }

    /// Consolidate old session turns into MEMORY.md via an LLM summary.
    ///
    /// Returns the summary when consolidation happened. Failure is reported as
    /// `None` — session state is never held hostage to a summarization call.
    pub async fn consolidate(&self, turns: &[Turn], provider: &dyn LlmProvider) -> Option<String> {
        if turns.len() < MIN_TURNS_TO_CONSOLIDATE {
            return None;
        }

        let conversation_text = turns
            .iter()
            .filter(|t| !t.content.is_empty())
            .map(|t| format!("{}: {}", t.role.as_str(), t.content))
            .collect::<Vec<_>>()
            .join("\n");

        let req = ChatRequest::new(
            String::new(), // provider default model
            vec![
                ChatMessage::system(SUMMARIZER_DIRECTIVE),
                ChatMessage::user(conversation_text),
            ],
        );

        match provider.generate(&req).await {
            Ok(resp) if !resp.content.is_empty() => {
                debug!(turns = turns.len(), "consolidated session turns into memory");
                self.save_fact(&resp.content);
                Some(resp.content)
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "memory consolidation failed");
                None
            }
        }
    }
}

fn append_to(path: &std::path::Path, text: &str) -> std::io::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    file.write_all(text.as_bytes())
}
