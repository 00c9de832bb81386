//! Shared wiring: config → provider → bus → agent loop.

use std::sync::Arc;

use tracing::warn;

use rotbot_agent::tools::ToolRegistry;
use rotbot_agent::AgentLoop;
use rotbot_core::bus::MessageBus;
use rotbot_core::config::RotbotConfig;
use rotbot_memory::MemoryStore;
use rotbot_providers::registry::create_provider;
use rotbot_providers::LlmProvider;
use rotbot_sessions::SessionManager;

pub struct Core {
    pub bus: Arc<MessageBus>,
    pub agent: AgentLoop,
    pub provider: Arc<dyn LlmProvider>,
}

/// Load config, missing file or parse failure falls back to defaults.
pub fn load_config() -> RotbotConfig {
    match RotbotConfig::load(None) {
        Ok(config) => config,
        Err(e) => {
            warn!(error = %e, "config load failed, using defaults");
            RotbotConfig::default()
        }
    }
}

/// Build the core runtime. The only fatal error: an unknown provider name.
pub fn build_core(config: &RotbotConfig) -> Result<Core, String> {
    let provider_name = config.agents.defaults.provider.clone();
    let provider_cfg = config.provider_config(None).cloned().unwrap_or_default();
    let provider = create_provider(&provider_name, &provider_cfg).map_err(|e| e.to_string())?;

    let bus = Arc::new(MessageBus::new());
    let sessions = SessionManager::open_default();
    let memory = Arc::new(MemoryStore::open_default());
    let mut tools = ToolRegistry::new();
    tools.register_builtins(&config.tools);

    let agent = AgentLoop::new(
        Arc::clone(&bus),
        sessions,
        memory,
        Arc::clone(&provider),
        Arc::new(tools),
        config,
    )
    .load_workspace();

    Ok(Core {
        bus,
        agent,
        provider,
    })
}
