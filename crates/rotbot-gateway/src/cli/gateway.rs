//! `rotbot gateway` — start all enabled non-terminal channels.

use std::sync::Arc;

use tracing::info;

use rotbot_channels::ChannelManager;
use rotbot_core::access::AccessStore;
use rotbot_discord::DiscordChannel;
use rotbot_telegram::TelegramChannel;

use super::runtime::{build_core, load_config};

pub async fn run() -> i32 {
    super::init_logging("info");

    let config = load_config();
    let core = match build_core(&config) {
        Ok(core) => core,
        Err(e) => {
            eprintln!("Error: {e}");
            return 1;
        }
    };

    let access = Arc::new(AccessStore::open_default());
    let mut manager = ChannelManager::new(Arc::clone(&core.bus));
    let mut enabled = 0;

    if config.channels.telegram.enabled {
        manager.register(Arc::new(TelegramChannel::new(
            Arc::clone(&core.bus),
            &config.channels.telegram,
            Arc::clone(&access),
        )));
        enabled += 1;
    }
    if config.channels.discord.enabled {
        manager.register(Arc::new(DiscordChannel::new(
            Arc::clone(&core.bus),
            &config.channels.discord,
            Arc::clone(&access),
        )));
        enabled += 1;
    }

    if enabled == 0 {
        eprintln!("No channels enabled. Edit ~/.rotbot/config.json or run `rotbot onboard`.");
        return 1;
    }

    info!(channels = enabled, "starting gateway");
    let manager = Arc::new(manager);

    let stopper = core.agent.stopper();
    let agent_task = tokio::spawn(core.agent.run());
    let manager_task = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.start_all().await })
    };

    // Run until interrupted.
    let _ = tokio::signal::ctrl_c().await;
    info!("shutting down");

    stopper.stop();
    manager.stop_all().await;
    core.bus.stop();
    core.provider.close().await;
    let _ = agent_task.await;
    let _ = manager_task.await;
    0
}
