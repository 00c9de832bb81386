//! Agent tool system — the `Tool` trait, the registry, and the built-ins.
//!
//! Tools are named, schema-described, side-effectful operations the LLM can
//! invoke. The registry dispatches by name and never lets a failure escape as
//! a panic: unknown names and execution errors both come back as structured
//! error results.

pub mod file_ops;
pub mod rag_search;
pub mod shell;
pub mod url_reader;

use std::collections::BTreeMap;

use async_trait::async_trait;
use tracing::{error, info};

use rotbot_core::config::ToolsConfig;
use rotbot_providers::ToolSchema;

/// Result of executing a tool, returned to the LLM as text.
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub output: String,
    pub success: bool,
}

impl ToolResult {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            success: true,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            output: message.into(),
            success: false,
        }
    }
}

/// Trait implemented by every agent tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique identifier (e.g. "shell").
    fn name(&self) -> &str;
    /// What the tool does — shown to the LLM.
    fn description(&self) -> &str;
    /// JSON Schema for the tool's parameters.
    fn parameters(&self) -> serde_json::Value;
    /// Execute with the given parameters.
    async fn execute(&self, params: serde_json::Value) -> ToolResult;
}

/// Registry and executor for agent tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Box<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn list(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// Ordered schema list for provider advertisement.
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters(),
            })
            .collect()
    }

    /// Execute a tool by name. Unknown names come back as error results,
    /// never as an error return.
    pub async fn execute(&self, name: &str, params: serde_json::Value) -> ToolResult {
        let Some(tool) = self.tools.get(name) else {
            let available = self.list().join(", ");
            return ToolResult::error(format!(
                "Error: Unknown tool '{name}'. Available: {available}"
            ));
        };
        let result = tool.execute(params).await;
        if !result.success {
            error!(tool = name, output = %result.output, "tool execution failed");
        }
        result
    }

    /// Register built-in tools named in the configuration allowlist.
    pub fn register_builtins(&mut self, config: &ToolsConfig) {
        let workspace = rotbot_core::paths::workspace_dir();
        for name in &config.builtin {
            match name.as_str() {
                "shell" => self.register(Box::new(shell::ShellTool::new(
                    config.restrict_to_workspace.then(|| workspace.clone()),
                ))),
                "file_ops" => self.register(Box::new(file_ops::FileOpsTool::new(
                    workspace.clone(),
                    config.restrict_to_workspace,
                ))),
                "url_reader" => self.register(Box::new(url_reader::UrlReaderTool::new())),
                "rag_search" => self.register(Box::new(rag_search::RagSearchTool::new(
                    rotbot_core::paths::rag_dir(),
                ))),
                other => tracing::warn!(tool = other, "unknown builtin tool in config"),
            }
        }
        info!(count = self.tools.len(), tools = self.list().join(", "), "registered tools");
    }
}
