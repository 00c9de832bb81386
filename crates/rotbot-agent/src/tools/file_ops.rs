//! File operations — read, write, append, list — with an optional workspace
//! sandbox.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use super::{Tool, ToolResult};

const MAX_READ_CHARS: usize = 8000;
const MAX_LIST_ENTRIES: usize = 100;

pub struct FileOpsTool {
    workspace: PathBuf,
    restrict: bool,
}

impl FileOpsTool {
    pub fn new(workspace: PathBuf, restrict: bool) -> Self {
        Self { workspace, restrict }
    }

    /// Resolve a user-supplied path. Relative paths land in the workspace;
    /// with the sandbox on, anything escaping the workspace is refused.
    fn resolve(&self, raw: &str) -> Option<PathBuf> {
        let p = Path::new(raw);
        let joined = if p.is_absolute() {
            normalize(p)
        } else {
            normalize(&self.workspace.join(p))
        };
        if self.restrict && !joined.starts_with(&self.workspace) {
            return None;
        }
        Some(joined)
    }
}

/// Lexically remove `.` and `..` components so the escape check cannot be
/// defeated by path tricks. Symlinks inside the workspace are the operator's
/// own choice.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[async_trait]
impl Tool for FileOpsTool {
    fn name(&self) -> &str {
        "file_ops"
    }

    fn description(&self) -> &str {
        "Read, write, edit, or list files. Operations: read, write, append, list. \
         Use this to interact with the filesystem."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "operation": {
                    "type": "string",
                    "enum": ["read", "write", "append", "list"],
                    "description": "The file operation to perform",
                },
                "path": {
                    "type": "string",
                    "description": "File or directory path",
                },
                "content": {
                    "type": "string",
                    "description": "Content to write (for write/append operations)",
                },
            },
            "required": ["operation", "path"],
        })
    }

    async fn execute(&self, params: serde_json::Value) -> ToolResult {
        let op = params.get("operation").and_then(|v| v.as_str()).unwrap_or("");
        let Some(raw_path) = params.get("path").and_then(|v| v.as_str()) else {
            return ToolResult::error("Error: No path provided");
        };
        let content = params.get("content").and_then(|v| v.as_str()).unwrap_or("");

        let Some(path) = self.resolve(raw_path) else {
            return ToolResult::error("Error: Path outside workspace");
        };

        match op {
            "read" => read_file(&path),
            "write" => write_file(&path, content),
            "append" => append_file(&path, content),
            "list" => list_dir(&path),
            other => ToolResult::error(format!("Error: Unknown operation '{other}'")),
        }
    }
}

fn read_file(path: &Path) -> ToolResult {
    if !path.exists() {
        return ToolResult::error(format!("File not found: {}", path.display()));
    }
    match std::fs::read_to_string(path) {
        Ok(text) => {
            if text.chars().count() > MAX_READ_CHARS {
                let truncated: String = text.chars().take(MAX_READ_CHARS).collect();
                ToolResult::success(truncated + "\n... (truncated)")
            } else {
                ToolResult::success(text)
            }
        }
        Err(e) => ToolResult::error(format!("Error reading {}: {e}", path.display())),
    }
}

fn write_file(path: &Path, content: &str) -> ToolResult {
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    match std::fs::write(path, content) {
        Ok(()) => ToolResult::success(format!(
            "Written {} chars to {}",
            content.len(),
            path.display()
        )),
        Err(e) => ToolResult::error(format!("Error writing {}: {e}", path.display())),
    }
}

fn append_file(path: &Path, content: &str) -> ToolResult {
    use std::io::Write;
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let result = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .and_then(|mut f| f.write_all(content.as_bytes()));
    match result {
        Ok(()) => ToolResult::success(format!(
            "Appended {} chars to {}",
            content.len(),
            path.display()
        )),
        Err(e) => ToolResult::error(format!("Error appending to {}: {e}", path.display())),
    }
}

fn list_dir(path: &Path) -> ToolResult {
    if !path.is_dir() {
        return ToolResult::error(format!("Not a directory: {}", path.display()));
    }
    let Ok(entries) = std::fs::read_dir(path) else {
        return ToolResult::error(format!("Error listing {}", path.display()));
    };
    let mut items: Vec<(bool, String, u64)> = entries
        .flatten()
        .map(|e| {
            let is_dir = e.path().is_dir();
            let size = e.metadata().map(|m| m.len()).unwrap_or(0);
            (is_dir, e.file_name().to_string_lossy().into_owned(), size)
        })
        .collect();
    items.sort_by(|a, b| (!a.0, &a.1).cmp(&(!b.0, &b.1)));

    let lines: Vec<String> = items
        .iter()
        .take(MAX_LIST_ENTRIES)
        .map(|(is_dir, name, size)| {
            if *is_dir {
                format!("d {name}")
            } else {
                format!("f {name} ({size}B)")
            }
        })
        .collect();
    if lines.is_empty() {
        ToolResult::success("(empty directory)")
    } else {
        ToolResult::success(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool(restrict: bool) -> (tempfile::TempDir, FileOpsTool) {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileOpsTool::new(dir.path().to_path_buf(), restrict);
        (dir, tool)
    }

    #[tokio::test]
    async fn write_then_read_round_trip() {
        let (_dir, tool) = tool(true);
        let result = tool
            .execute(serde_json::json!({
                "operation": "write", "path": "notes.txt", "content": "hello"
            }))
            .await;
        assert!(result.success, "{}", result.output);

        let result = tool
            .execute(serde_json::json!({"operation": "read", "path": "notes.txt"}))
            .await;
        assert!(result.success);
        assert_eq!(result.output, "hello");
    }

    #[tokio::test]
    async fn append_accumulates() {
        let (_dir, tool) = tool(true);
        for chunk in ["a", "b", "c"] {
            tool.execute(serde_json::json!({
                "operation": "append", "path": "log.txt", "content": chunk
            }))
            .await;
        }
        let result = tool
            .execute(serde_json::json!({"operation": "read", "path": "log.txt"}))
            .await;
        assert_eq!(result.output, "abc");
    }

    #[tokio::test]
    async fn sandbox_refuses_escapes() {
        let (_dir, tool) = tool(true);
        for path in ["../outside.txt", "/etc/passwd", "a/../../outside"] {
            let result = tool
                .execute(serde_json::json!({"operation": "read", "path": path}))
                .await;
            assert!(!result.success, "path should be refused: {path}");
            assert!(result.output.contains("outside workspace"));
        }
    }

    #[tokio::test]
    async fn unrestricted_allows_absolute_paths() {
        let (dir, tool) = tool(false);
        let outside = dir.path().join("anywhere.txt");
        std::fs::write(&outside, "data").unwrap();
        let result = tool
            .execute(serde_json::json!({
                "operation": "read", "path": outside.to_str().unwrap()
            }))
            .await;
        assert!(result.success);
        assert_eq!(result.output, "data");
    }

    #[tokio::test]
    async fn list_marks_directories_and_files() {
        let (dir, tool) = tool(true);
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("file.txt"), "xy").unwrap();
        let result = tool
            .execute(serde_json::json!({"operation": "list", "path": "."}))
            .await;
        assert!(result.success);
        let lines: Vec<&str> = result.output.lines().collect();
        assert_eq!(lines[0], "d sub");
        assert_eq!(lines[1], "f file.txt (2B)");
    }

    #[tokio::test]
    async fn unknown_operation_is_an_error() {
        let (_dir, tool) = tool(true);
        let result = tool
            .execute(serde_json::json!({"operation": "move", "path": "x"}))
            .await;
        assert!(!result.success);
        assert!(result.output.contains("Unknown operation"));
    }
}
