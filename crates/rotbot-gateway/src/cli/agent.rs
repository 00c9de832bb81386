//! `rotbot agent` — interactive terminal chat, or one-shot with `-m`.

use std::sync::Arc;
use std::time::Duration;

use rotbot_channels::{ChannelManager, CliChannel};

use super::runtime::{build_core, load_config};

pub async fn run(message: Option<String>, _no_markdown: bool, logs: bool) -> i32 {
    if logs {
        super::init_logging("debug");
    } else {
        super::init_logging("warn");
    }

    let config = load_config();
    let core = match build_core(&config) {
        Ok(core) => core,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!("Run `rotbot onboard` to configure a provider.");
            return 1;
        }
    };

    let cli = Arc::new(CliChannel::new(Arc::clone(&core.bus)));
    let mut manager = ChannelManager::new(Arc::clone(&core.bus));
    manager.register(cli.clone());
    let manager = Arc::new(manager);

    let stopper = core.agent.stopper();
    let agent_task = tokio::spawn(core.agent.run());
    let manager_task = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.start_all().await })
    };

    if let Some(message) = message {
        // Single-message mode: one turn, then exit once nothing is pending.
        cli.publish_line(&message);
        cli.wait_for_turn().await;
        while core.bus.inbound_pending() > 0 || core.bus.outbound_pending() > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    } else {
        cli.run_interactive().await;
    }

    stopper.stop();
    manager.stop_all().await;
    core.bus.stop();
    core.provider.close().await;
    let _ = agent_task.await;
    let _ = manager_task.await;
    0
}
