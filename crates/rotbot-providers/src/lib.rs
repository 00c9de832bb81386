//! LLM provider contract and built-in backends.
//!
//! Two backends ship with rotbot: [`ollama::OllamaProvider`] speaks the local
//! JSON-lines chat protocol, [`openai_compat::OpenAiCompatProvider`] speaks
//! the SSE chat-completions protocol used by OpenAI, Anthropic, Groq,
//! OpenRouter and friends. Selection is by name from configuration via
//! [`registry::create_provider`].

pub mod guardrail;
pub mod ollama;
pub mod openai_compat;
pub mod provider;
pub mod registry;

pub use provider::{
    ChatMessage, ChatRequest, FinishReason, LlmProvider, LlmResponse, ProviderError, Role,
    StreamEvent, ToolCall, ToolSchema,
};
