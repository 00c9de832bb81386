//! Persistent access-control store shared across channel adapters.
//!
//! Approved and pending users live in `~/.rotbot/approved_users.json`. This is
//! the only state mutated from multiple tasks, so every read-modify-write
//! cycle runs under one mutex and persists before releasing it.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;

/// Metadata recorded for an approved or pending user.
pub type UserInfo = HashMap<String, serde_json::Value>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AccessData {
    #[serde(flatten)]
    approved: HashMap<String, HashMap<String, UserInfo>>,
    #[serde(default)]
    pending: HashMap<String, HashMap<String, UserInfo>>,
}

/// Mutex-guarded view over the approved-users file.
pub struct AccessStore {
    path: PathBuf,
    data: Mutex<AccessData>,
}

impl AccessStore {
    /// Load the store from `path`, creating an empty file if missing.
    /// A corrupt file is replaced with an empty store rather than aborting.
    pub fn load(path: PathBuf) -> Self {
        let data = match std::fs::read_to_string(&path) {
            Ok(text) => match serde_json::from_str::<AccessData>(&text) {
                Ok(data) => data,
                Err(e) => {
                    warn!(error = %e, "access store unreadable, starting empty");
                    AccessData::default()
                }
            },
            Err(_) => AccessData::default(),
        };
        let store = Self {
            path,
            data: Mutex::new(data),
        };
        let _ = store.persist();
        store
    }

    /// Load from the default workspace location.
    pub fn open_default() -> Self {
        Self::load(crate::paths::access_store_path())
    }

    pub fn is_approved(&self, platform: &str, user_id: &str) -> bool {
        let data = self.data.lock().unwrap();
        data.approved
            .get(platform)
            .map(|m| m.contains_key(user_id))
            .unwrap_or(false)
    }

    pub fn is_pending(&self, platform: &str, user_id: &str) -> bool {
        let data = self.data.lock().unwrap();
        data.pending
            .get(platform)
            .map(|m| m.contains_key(user_id))
            .unwrap_or(false)
    }

    pub fn pending(&self, platform: &str) -> HashMap<String, UserInfo> {
        let data = self.data.lock().unwrap();
        data.pending.get(platform).cloned().unwrap_or_default()
    }

    /// Move a user from pending to approved, stamping `approved_at`.
    pub fn approve(&self, platform: &str, user_id: &str) -> Result<()> {
        {
            let mut data = self.data.lock().unwrap();
            let mut info = data
                .pending
                .get_mut(platform)
                .and_then(|m| m.remove(user_id))
                .unwrap_or_default();
            info.insert(
                "approved_at".to_string(),
                serde_json::Value::String(now_stamp()),
            );
            data.approved
                .entry(platform.to_string())
                .or_default()
                .insert(user_id.to_string(), info);
        }
        info!(platform, user_id, "approved user");
        self.persist()
    }

    /// Remove an approved user. Returns whether anything was removed.
    pub fn revoke(&self, platform: &str, user_id: &str) -> Result<bool> {
        let removed = {
            let mut data = self.data.lock().unwrap();
            data.approved
                .get_mut(platform)
                .and_then(|m| m.remove(user_id))
                .is_some()
        };
        if removed {
            info!(platform, user_id, "revoked user");
            self.persist()?;
        }
        Ok(removed)
    }

    /// Record an access request, stamping `request_time`.
    pub fn add_pending(&self, platform: &str, user_id: &str, mut info: UserInfo) -> Result<()> {
        {
            let mut data = self.data.lock().unwrap();
            info.insert(
                "request_time".to_string(),
                serde_json::Value::String(now_stamp()),
            );
            data.pending
                .entry(platform.to_string())
                .or_default()
                .insert(user_id.to_string(), info);
        }
        self.persist()
    }

    pub fn remove_pending(&self, platform: &str, user_id: &str) -> Result<()> {
        {
            let mut data = self.data.lock().unwrap();
            if let Some(m) = data.pending.get_mut(platform) {
                m.remove(user_id);
            }
        }
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let text = {
            let data = self.data.lock().unwrap();
            serde_json::to_string_pretty(&*data)?
        };
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

fn now_stamp() -> String {
    chrono::Utc::now().format("%Y-%m-%d %H:%M UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, AccessStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = AccessStore::load(dir.path().join("approved_users.json"));
        (dir, store)
    }

    #[test]
    fn approve_moves_user_out_of_pending() {
        let (_dir, store) = temp_store();
        store
            .add_pending("telegram", "123", UserInfo::new())
            .unwrap();
        assert!(store.is_pending("telegram", "123"));
        assert!(!store.is_approved("telegram", "123"));

        store.approve("telegram", "123").unwrap();
        assert!(store.is_approved("telegram", "123"));
        assert!(!store.is_pending("telegram", "123"));
    }

    #[test]
    fn state_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("approved_users.json");
        {
            let store = AccessStore::load(path.clone());
            store.approve("discord", "42").unwrap();
        }
        let store = AccessStore::load(path);
        assert!(store.is_approved("discord", "42"));
    }

    #[test]
    fn revoke_reports_whether_user_existed() {
        let (_dir, store) = temp_store();
        store.approve("telegram", "9").unwrap();
        assert!(store.revoke("telegram", "9").unwrap());
        assert!(!store.revoke("telegram", "9").unwrap());
    }

    #[test]
    fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("approved_users.json");
        std::fs::write(&path, "{not json").unwrap();
        let store = AccessStore::load(path);
        assert!(!store.is_approved("telegram", "1"));
    }
}
