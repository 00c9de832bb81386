//! `rotbot status` — one-page system summary.

use rotbot_core::paths;
use rotbot_sessions::SessionManager;

use super::runtime::load_config;

pub fn run() -> i32 {
    let config = load_config();
    let defaults = &config.agents.defaults;

    println!("rotbot status");
    println!("  home:      {}", paths::rotbot_dir().display());
    println!("  provider:  {} (model: {})", defaults.provider, defaults.model);
    println!(
        "  channels:  telegram={} discord={}",
        on_off(config.channels.telegram.enabled),
        on_off(config.channels.discord.enabled),
    );
    println!("  tools:     {}", config.tools.builtin.join(", "));

    let sessions = SessionManager::open_default();
    println!("  sessions:  {}", sessions.list().len());

    let memory_file = paths::memory_dir().join("MEMORY.md");
    let memory_size = std::fs::metadata(&memory_file).map(|m| m.len()).unwrap_or(0);
    println!("  memory:    {memory_size} bytes consolidated");
    0
}

fn on_off(enabled: bool) -> &'static str {
    if enabled {
        "on"
    } else {
        "off"
    }
}
