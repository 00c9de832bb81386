//! `rotbot onboard` — write the default config and workspace scaffolding.

use rotbot_core::config::RotbotConfig;
use rotbot_core::paths;

pub fn run() -> i32 {
    let config_path = paths::config_path();
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
    } else {
        let config = RotbotConfig::default();
        match serde_json::to_string_pretty(&config) {
            Ok(text) => {
                if let Err(e) = std::fs::write(&config_path, text) {
                    eprintln!("Error: failed to write config: {e}");
                    return 1;
                }
                println!("Wrote default config to {}", config_path.display());
            }
            Err(e) => {
                eprintln!("Error: {e}");
                return 1;
            }
        }
    }

    // Create the workspace tree so every subsystem finds its directory.
    let workspace = paths::workspace_dir();
    let _ = paths::sessions_dir();
    let _ = paths::memory_dir();
    let _ = paths::skills_dir();
    let _ = paths::rag_dir();

    println!("Workspace ready at {}", workspace.display());
    println!("Edit {} to enable channels and providers.", paths::config_path().display());
    println!("Add a persona in {}/SOUL.md (optional).", workspace.display());
    0
}
