//! Provider selection by configuration name.

use std::sync::Arc;

use rotbot_core::config::ProviderConfig;

use crate::ollama::OllamaProvider;
use crate::openai_compat::OpenAiCompatProvider;
use crate::provider::{LlmProvider, ProviderError};

/// Names accepted by [`create_provider`]. `custom` is any OpenAI-compatible
/// endpoint the user points `apiBase` at.
pub const AVAILABLE: &[&str] = &[
    "ollama",
    "openai",
    "anthropic",
    "gemini",
    "openrouter",
    "deepseek",
    "groq",
    "siliconflow",
    "minimax",
    "moonshot",
    "dashscope",
    "custom",
];

/// Build a provider instance by name. The one fatal configuration error in
/// the system: an unknown name here aborts startup.
pub fn create_provider(
    name: &str,
    config: &ProviderConfig,
) -> Result<Arc<dyn LlmProvider>, ProviderError> {
    match name {
        "ollama" => Ok(Arc::new(OllamaProvider::new(config))),
        n if AVAILABLE.contains(&n) => Ok(Arc::new(OpenAiCompatProvider::new(n, config))),
        _ => Err(ProviderError::UnknownProvider {
            name: name.to_string(),
            available: AVAILABLE.join(", "),
        }),
    }
}
