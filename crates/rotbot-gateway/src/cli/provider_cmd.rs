//! `rotbot provider` — list and manage LLM backends.

use rotbot_providers::registry::AVAILABLE;

use super::runtime::load_config;

pub fn list() -> i32 {
    let config = load_config();
    let default = &config.agents.defaults.provider;

    println!("Configured providers:");
    let mut names: Vec<&String> = config.providers.keys().collect();
    names.sort();
    for name in names {
        let marker = if name == default { " (default)" } else { "" };
        let model = &config.providers[name].default_model;
        println!("  {name}{marker} — model: {model}");
    }

    println!("\nSupported provider names:");
    println!("  {}", AVAILABLE.join(", "));
    0
}

pub fn add() -> i32 {
    println!("Add a provider by editing ~/.rotbot/config.json, e.g.:");
    println!(
        "{}",
        r#"  "providers": { "groq": { "apiKey": "...", "default_model": "llama-3.3-70b-versatile" } }"#
    );
    println!("Then set `agents.defaults.provider` to its name.");
    0
}

pub fn login() -> i32 {
    println!("OAuth login is not supported; configure an API key in ~/.rotbot/config.json.");
    0
}
