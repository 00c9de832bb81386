pub mod agent;
pub mod gateway;
pub mod onboard;
pub mod provider_cmd;
pub mod runtime;
pub mod status;

/// Initialize the tracing subscriber once with a default filter.
pub fn init_logging(default_filter: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
