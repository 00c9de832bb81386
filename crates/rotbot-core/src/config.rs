//! Configuration loader for `~/.rotbot/config.json`.
//!
//! Built-in defaults ← user JSON file ← `ROTBOT_*` environment overrides,
//! merged with figment. Missing sections inherit defaults; user values win.

use std::collections::HashMap;
use std::path::Path;

use figment::{
    providers::{Env, Format, Json, Serialized},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Result, RotbotError};

/// Top-level config tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RotbotConfig {
    #[serde(default = "default_providers")]
    pub providers: HashMap<String, ProviderConfig>,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl Default for RotbotConfig {
    fn default() -> Self {
        Self {
            providers: default_providers(),
            agents: AgentsConfig::default(),
            channels: ChannelsConfig::default(),
            tools: ToolsConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

/// One LLM backend entry under `providers.<name>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Server URL for local backends (Ollama).
    pub base_url: Option<String>,
    /// API base for OpenAI-compatible backends.
    #[serde(alias = "apiBase")]
    pub api_base: Option<String>,
    #[serde(alias = "apiKey", default)]
    pub api_key: String,
    #[serde(default)]
    pub default_model: String,
    /// Optional per-mode model overrides.
    #[serde(default)]
    pub models: ModelTable,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelTable {
    pub coding: Option<String>,
    pub reasoning: Option<String>,
    pub vision: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentsConfig {
    #[serde(default)]
    pub defaults: AgentDefaults,
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            defaults: AgentDefaults::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefaults {
    #[serde(default = "default_provider_name")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// Per-turn ceiling on streaming + tool cycles.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    /// How many trailing turns are sent to the LLM and kept after
    /// consolidation.
    #[serde(default = "default_memory_window")]
    pub memory_window: usize,
}

impl Default for AgentDefaults {
    fn default() -> Self {
        Self {
            provider: default_provider_name(),
            model: default_model(),
            max_iterations: default_max_iterations(),
            memory_window: default_memory_window(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub telegram: TelegramChannelConfig,
    #[serde(default)]
    pub discord: DiscordChannelConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelegramChannelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub token: String,
    /// Telegram user ID allowed to approve other users. 0 disables gating.
    #[serde(default)]
    pub admin_id: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscordChannelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub admin_id: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Names of built-in tools to register.
    #[serde(default = "default_builtin_tools")]
    pub builtin: Vec<String>,
    /// Confine shell and file tools to the workspace directory.
    #[serde(alias = "restrictToWorkspace", default)]
    pub restrict_to_workspace: bool,
    /// MCP server definitions — accepted in config for forward compatibility;
    /// the subprocess client lives outside this codebase.
    #[serde(alias = "mcpServers", default)]
    pub mcp_servers: HashMap<String, serde_json::Value>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            builtin: default_builtin_tools(),
            restrict_to_workspace: false,
            mcp_servers: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    #[serde(default = "default_consolidation_threshold")]
    pub consolidation_threshold: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            consolidation_threshold: default_consolidation_threshold(),
        }
    }
}

impl RotbotConfig {
    /// Load from `path` (defaults to `~/.rotbot/config.json`) with `ROTBOT_*`
    /// env overrides. A missing file yields pure defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path
            .map(|p| p.to_path_buf())
            .unwrap_or_else(crate::paths::config_path);

        Figment::from(Serialized::defaults(RotbotConfig::default()))
            .merge(Json::file(&path))
            .merge(Env::prefixed("ROTBOT_").split("__"))
            .extract()
            .map_err(|e| RotbotError::Config(e.to_string()))
    }

    /// Config block for the named provider (or the default provider).
    pub fn provider_config(&self, name: Option<&str>) -> Option<&ProviderConfig> {
        let name = name.unwrap_or(&self.agents.defaults.provider);
        self.providers.get(name)
    }
}

fn default_providers() -> HashMap<String, ProviderConfig> {
    let mut map = HashMap::new();
    map.insert(
        "ollama".to_string(),
        ProviderConfig {
            base_url: Some("http://localhost:11434".to_string()),
            api_base: None,
            api_key: String::new(),
            default_model: default_model(),
            models: ModelTable {
                coding: Some("qwen2.5-coder:7b".to_string()),
                reasoning: Some("deepseek-r1:8b".to_string()),
                vision: Some("llava".to_string()),
            },
        },
    );
    map
}

fn default_provider_name() -> String {
    "ollama".to_string()
}
fn default_model() -> String {
    "llama3.1:8b".to_string()
}
fn default_max_iterations() -> usize {
    20
}
fn default_memory_window() -> usize {
    20
}
fn default_builtin_tools() -> Vec<String> {
    vec![
        "shell".to_string(),
        "file_ops".to_string(),
        "url_reader".to_string(),
        "rag_search".to_string(),
    ]
}
fn default_consolidation_threshold() -> usize {
    20
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_sane() {
        let cfg = RotbotConfig::default();
        assert_eq!(cfg.agents.defaults.provider, "ollama");
        assert_eq!(cfg.agents.defaults.memory_window, 20);
        assert_eq!(cfg.agents.defaults.max_iterations, 20);
        assert!(!cfg.channels.telegram.enabled);
        assert!(cfg.providers.contains_key("ollama"));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let cfg = RotbotConfig::load(Some(Path::new("/nonexistent/config.json"))).unwrap();
        assert_eq!(cfg.agents.defaults.model, "llama3.1:8b");
    }

    #[test]
    fn user_values_override_defaults_and_merge() {
        let mut file = tempfile::NamedTempFile::with_suffix(".json").unwrap();
        write!(
            file,
            r#"{{
                "agents": {{ "defaults": {{ "model": "mistral:7b", "memory_window": 6 }} }},
                "providers": {{ "groq": {{ "apiKey": "gk-123", "default_model": "llama-3.3-70b" }} }},
                "channels": {{ "telegram": {{ "enabled": true, "token": "t", "admin_id": 42 }} }}
            }}"#
        )
        .unwrap();

        let cfg = RotbotConfig::load(Some(file.path())).unwrap();
        assert_eq!(cfg.agents.defaults.model, "mistral:7b");
        assert_eq!(cfg.agents.defaults.memory_window, 6);
        // Untouched fields keep their defaults.
        assert_eq!(cfg.agents.defaults.provider, "ollama");
        assert_eq!(cfg.providers["groq"].api_key, "gk-123");
        assert!(cfg.providers.contains_key("ollama"));
        assert!(cfg.channels.telegram.enabled);
        assert_eq!(cfg.channels.telegram.admin_id, 42);
    }

    #[test]
    fn camel_case_aliases_accepted() {
        let mut file = tempfile::NamedTempFile::with_suffix(".json").unwrap();
        write!(
            file,
            r#"{{ "tools": {{ "builtin": ["shell"], "restrictToWorkspace": true }} }}"#
        )
        .unwrap();
        let cfg = RotbotConfig::load(Some(file.path())).unwrap();
        assert!(cfg.tools.restrict_to_workspace);
        assert_eq!(cfg.tools.builtin, vec!["shell"]);
    }
}
