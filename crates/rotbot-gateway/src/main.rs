use clap::{Parser, Subcommand};

mod cli;

#[derive(Parser)]
#[command(
    name = "rotbot",
    about = "rotbot — the open agent framework for every platform",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize config and workspace
    Onboard,
    /// Interactive chat mode (terminal adapter only)
    Agent {
        /// Send a single message and exit
        #[arg(short, long)]
        message: Option<String>,
        /// Plain text output
        #[arg(long)]
        no_markdown: bool,
        /// Show runtime logs
        #[arg(long)]
        logs: bool,
    },
    /// Start all enabled channels
    Gateway,
    /// Manage LLM providers
    Provider {
        #[command(subcommand)]
        action: ProviderAction,
    },
    /// Show system status
    Status,
}

#[derive(Subcommand)]
enum ProviderAction {
    /// Add a new provider
    Add,
    /// List providers
    List,
    /// OAuth login for a provider
    Login,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let code = match cli.command {
        Commands::Onboard => cli::onboard::run(),
        Commands::Agent {
            message,
            no_markdown,
            logs,
        } => cli::agent::run(message, no_markdown, logs).await,
        Commands::Gateway => cli::gateway::run().await,
        Commands::Provider { action } => match action {
            ProviderAction::Add => cli::provider_cmd::add(),
            ProviderAction::List => cli::provider_cmd::list(),
            ProviderAction::Login => cli::provider_cmd::login(),
        },
        Commands::Status => cli::status::run(),
    };

    std::process::exit(code);
}
