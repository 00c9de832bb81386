//! Workspace layout under `~/.rotbot`.
//!
//! Directories are created on demand so the first run works without a setup
//! step. All path helpers honour the `ROTBOT_HOME` override, which the tests
//! use to point the store at a temp directory.

use std::path::PathBuf;

/// Root data directory: `$ROTBOT_HOME` or `~/.rotbot`.
pub fn rotbot_dir() -> PathBuf {
    let root = match std::env::var("ROTBOT_HOME") {
        Ok(p) if !p.is_empty() => PathBuf::from(p),
        _ => {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".rotbot")
        }
    };
    let _ = std::fs::create_dir_all(&root);
    root
}

pub fn config_path() -> PathBuf {
    rotbot_dir().join("config.json")
}

pub fn workspace_dir() -> PathBuf {
    subdir("workspace")
}

pub fn sessions_dir() -> PathBuf {
    subdir("sessions")
}

pub fn memory_dir() -> PathBuf {
    subdir("memory")
}

pub fn skills_dir() -> PathBuf {
    subdir("skills")
}

pub fn rag_dir() -> PathBuf {
    subdir("rag")
}

pub fn access_store_path() -> PathBuf {
    rotbot_dir().join("approved_users.json")
}

fn subdir(name: &str) -> PathBuf {
    let dir = rotbot_dir().join(name);
    let _ = std::fs::create_dir_all(&dir);
    dir
}
