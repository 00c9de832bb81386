//! System prompt assembly — persona, user context, long-term memory,
//! conversation analysis, tool descriptions, skills, and the current date.

use rotbot_memory::MemoryStore;
use rotbot_providers::{ChatMessage, Role as WireRole, ToolSchema};
use rotbot_sessions::{Role, Session};

use crate::analyzer::{analyze_context, ConversationContext};
use crate::skills::SkillSet;

/// A memory document shorter than this is just the file header — skip it.
const MIN_MEMORY_CHARS: usize = 50;

const DEFAULT_SYSTEM_PROMPT: &str = "You are rotbot, a helpful AI assistant. You are friendly, concise, and knowledgeable. \
Answer questions clearly and provide helpful information. \
If you don't know something, say so honestly.";

const CODING_PROMPT: &str = "You are rotbot in coding mode. You are an expert software engineer. \
Write clean, efficient, well-documented code. Explain your reasoning. \
Use best practices and modern patterns. If asked to debug, identify the root cause first.";

const REASONING_PROMPT: &str = "You are rotbot in reasoning mode. Think step by step through problems. \
Break complex questions into smaller parts. Show your reasoning process. \
Use <think>...</think> tags to show your internal reasoning before giving the final answer.";

/// Per-user conversational mode, selecting the default persona directive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    General,
    Coding,
    Reasoning,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::General => "general",
            Mode::Coding => "coding",
            Mode::Reasoning => "reasoning",
        }
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            Mode::General => DEFAULT_SYSTEM_PROMPT,
            Mode::Coding => CODING_PROMPT,
            Mode::Reasoning => REASONING_PROMPT,
        }
    }
}

/// Everything the prompt builder draws from.
pub struct PromptInputs<'a> {
    pub mode: Mode,
    pub memory: &'a MemoryStore,
    pub session: &'a Session,
    /// Persona override from `workspace/SOUL.md`.
    pub soul: Option<&'a str>,
    /// User context from `workspace/USER.md`.
    pub user_context: Option<&'a str>,
    pub tool_schemas: &'a [ToolSchema],
    pub skills: &'a SkillSet,
}

/// Assemble the complete system prompt.
pub fn build_system_prompt(inputs: &PromptInputs<'_>) -> String {
    let mut parts: Vec<String> = Vec::new();

    // 1. Soul / personality — workspace override wins over the mode default.
    match inputs.soul {
        Some(soul) => parts.push(soul.to_string()),
        None => parts.push(inputs.mode.prompt().to_string()),
    }

    // 2. User context
    if let Some(user) = inputs.user_context {
        parts.push(format!("\n## About the User\n{user}"));
    }

    // 3. Long-term memory
    let memory_doc = inputs.memory.read_memory();
    if memory_doc.len() > MIN_MEMORY_CHARS {
        parts.push(format!("\n## Your Memory\n{memory_doc}"));
    }

    // 4. Conversation analysis
    if let Some(context) = analyze_context(&inputs.session.history) {
        if let Some(section) = context_section(&context) {
            parts.push(section);
        }
    }

    // 5. Tool descriptions
    if !inputs.tool_schemas.is_empty() {
        let mut lines = vec!["\n## Available Tools".to_string()];
        for schema in inputs.tool_schemas {
            lines.push(format!("- **{}**: {}", schema.name, schema.description));
        }
        parts.push(lines.join("\n"));
    }

    // 6. Skills — always-load bodies in full, the rest as an index.
    for body in inputs.skills.always_load_prompts() {
        parts.push(body);
    }
    if let Some(index) = inputs.skills.summary_index() {
        parts.push(index);
    }

    // 7. Current date
    parts.push(format!(
        "\nCurrent date: {}",
        chrono::Local::now().format("%Y-%m-%d")
    ));

    parts.join("\n\n")
}

fn context_section(context: &ConversationContext) -> Option<String> {
    let mut lines: Vec<String> = Vec::new();
    if let Some(topic) = &context.topic {
        lines.push(format!("Topic: {topic}"));
    }
    if context.conversation_type != "general" {
        lines.push(format!("Conversation type: {}", context.conversation_type));
    }
    if !context.key_entities.is_empty() {
        let subjects: Vec<&str> = context
            .key_entities
            .iter()
            .take(5)
            .map(|s| s.as_str())
            .collect();
        lines.push(format!("Key subjects: {}", subjects.join(", ")));
    }
    if let Some(referent) = &context.referent {
        lines.push(format!("\"it\"/\"that\" likely refers to: {referent}"));
    }
    if lines.is_empty() {
        return None;
    }
    let bullet_lines: Vec<String> = lines.iter().map(|l| format!("- {l}")).collect();
    Some(format!(
        "\n## Conversation Context\n{}",
        bullet_lines.join("\n")
    ))
}

/// Build the full message list: system prompt plus the trailing
/// `max_history` session turns.
pub fn build_messages(
    session: &Session,
    system_prompt: &str,
    max_history: usize,
) -> Vec<ChatMessage> {
    let mut messages = vec![ChatMessage::system(system_prompt)];
    for turn in session.recent(max_history) {
        let role = match turn.role {
            Role::User => WireRole::User,
            Role::Assistant => WireRole::Assistant,
            Role::System => WireRole::System,
        };
        messages.push(ChatMessage {
            role,
            content: turn.content.clone(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        });
    }
    messages
}
