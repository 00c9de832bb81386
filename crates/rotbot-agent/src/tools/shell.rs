//! Shell command execution with a blocked-command screen and timeout.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{Tool, ToolResult};

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_TIMEOUT_SECS: u64 = 120;
const MAX_OUTPUT_CHARS: usize = 4000;

/// Substrings that mark a command as too dangerous to run.
const BLOCKED_COMMANDS: &[&str] = &[
    "rm -rf /",
    "mkfs",
    "dd if=",
    ":(){:|:&};:",
    "chmod -r 777 /",
];

pub struct ShellTool {
    /// When set, commands run with this working directory.
    workspace: Option<PathBuf>,
}

impl ShellTool {
    pub fn new(workspace: Option<PathBuf>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "shell"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return the output. \
         Use this for running scripts, checking system info, or file operations."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute",
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default 30)",
                    "default": 30,
                },
            },
            "required": ["command"],
        })
    }

    async fn execute(&self, params: serde_json::Value) -> ToolResult {
        let Some(command) = params.get("command").and_then(|c| c.as_str()) else {
            return ToolResult::error("Error: No command provided");
        };
        let timeout_secs = params
            .get("timeout")
            .and_then(|t| t.as_u64())
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .min(MAX_TIMEOUT_SECS);

        let lowered = command.to_lowercase();
        if BLOCKED_COMMANDS.iter().any(|b| lowered.contains(b)) {
            return ToolResult::error("Blocked: dangerous command");
        }

        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command).kill_on_drop(true);
        if let Some(dir) = &self.workspace {
            cmd.current_dir(dir);
        }

        let output = match tokio::time::timeout(
            Duration::from_secs(timeout_secs),
            cmd.output(),
        )
        .await
        {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return ToolResult::error(format!("Error: {e}")),
            Err(_) => {
                return ToolResult::error(format!("Command timed out after {timeout_secs}s"))
            }
        };

        let mut parts: Vec<String> = Vec::new();
        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            parts.push(stdout.trim().to_string());
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            parts.push(format!("STDERR: {}", stderr.trim()));
        }

        let mut text = if parts.is_empty() {
            "(no output)".to_string()
        } else {
            parts.join("\n")
        };
        if text.chars().count() > MAX_OUTPUT_CHARS {
            text = text.chars().take(MAX_OUTPUT_CHARS).collect::<String>() + "\n... (truncated)";
        }

        ToolResult {
            output: text,
            success: output.status.success(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn runs_a_command_and_captures_stdout() {
        let tool = ShellTool::new(None);
        let result = tool
            .execute(serde_json::json!({"command": "echo shell-works"}))
            .await;
        assert!(result.success);
        assert_eq!(result.output, "shell-works");
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_failure_with_stderr() {
        let tool = ShellTool::new(None);
        let result = tool
            .execute(serde_json::json!({"command": "echo oops >&2; exit 3"}))
            .await;
        assert!(!result.success);
        assert!(result.output.contains("STDERR: oops"));
    }

    #[tokio::test]
    async fn dangerous_commands_are_blocked() {
        let tool = ShellTool::new(None);
        let result = tool
            .execute(serde_json::json!({"command": "sudo rm -rf / --no-preserve-root"}))
            .await;
        assert!(!result.success);
        assert!(result.output.contains("Blocked"));
    }

    #[tokio::test]
    async fn missing_command_is_an_error() {
        let tool = ShellTool::new(None);
        let result = tool.execute(serde_json::json!({})).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn workspace_restriction_sets_cwd() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ShellTool::new(Some(dir.path().to_path_buf()));
        let result = tool.execute(serde_json::json!({"command": "pwd"})).await;
        assert!(result.success);
        let reported = std::fs::canonicalize(result.output.trim()).unwrap();
        let expected = std::fs::canonicalize(dir.path()).unwrap();
        assert_eq!(reported, expected);
    }
}
