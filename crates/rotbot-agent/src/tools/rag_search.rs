//! Knowledge-base search over `~/.rotbot/rag/<collection>.jsonl`.
//!
//! The store is opaque to the core: one JSON record per line with a `text`
//! field and optional `source`. Retrieval is keyword scoring — no embeddings.

use std::path::PathBuf;

use async_trait::async_trait;

use super::{Tool, ToolResult};

const DEFAULT_TOP_K: usize = 5;
const MAX_SNIPPET_CHARS: usize = 600;

pub struct RagSearchTool {
    rag_dir: PathBuf,
}

impl RagSearchTool {
    pub fn new(rag_dir: PathBuf) -> Self {
        Self { rag_dir }
    }

    fn search(&self, collection: &str, query: &str, top_k: usize) -> Vec<(usize, String, String)> {
        let path = self.rag_dir.join(format!("{collection}.jsonl"));
        let Ok(text) = std::fs::read_to_string(&path) else {
            return Vec::new();
        };

        let terms: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(|s| s.to_string())
            .collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<(usize, String, String)> = Vec::new();
        for line in text.lines() {
            let Ok(record) = serde_json::from_str::<serde_json::Value>(line) else {
                continue;
            };
            let Some(doc_text) = record.get("text").and_then(|t| t.as_str()) else {
                continue;
            };
            let lowered = doc_text.to_lowercase();
            let score = terms.iter().filter(|t| lowered.contains(*t)).count();
            if score > 0 {
                let source = record
                    .get("source")
                    .and_then(|s| s.as_str())
                    .unwrap_or("unknown")
                    .to_string();
                scored.push((score, doc_text.to_string(), source));
            }
        }

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.truncate(top_k);
        scored
    }
}

#[async_trait]
impl Tool for RagSearchTool {
    fn name(&self) -> &str {
        "rag_search"
    }

    fn description(&self) -> &str {
        "Search the local knowledge base for relevant documents and context. \
         Use this when the user asks about topics you've previously ingested \
         or when you need to retrieve stored information."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query to find relevant documents",
                },
                "collection": {
                    "type": "string",
                    "description": "The collection to search (default: 'default')",
                    "default": "default",
                },
                "top_k": {
                    "type": "integer",
                    "description": "Number of results to return (default 5)",
                    "default": 5,
                },
            },
            "required": ["query"],
        })
    }

    async fn execute(&self, params: serde_json::Value) -> ToolResult {
        let Some(query) = params.get("query").and_then(|q| q.as_str()) else {
            return ToolResult::error("Error: No search query provided");
        };
        let collection = params
            .get("collection")
            .and_then(|c| c.as_str())
            .unwrap_or("default");
        let top_k = params
            .get("top_k")
            .and_then(|k| k.as_u64())
            .unwrap_or(DEFAULT_TOP_K as u64) as usize;

        let results = self.search(collection, query, top_k.max(1));
        if results.is_empty() {
            return ToolResult::success(format!("No relevant documents found for: {query}"));
        }

        let blocks: Vec<String> = results
            .iter()
            .map(|(score, text, source)| {
                let snippet: String = text.chars().take(MAX_SNIPPET_CHARS).collect();
                format!("[{source}] (score {score})\n{snippet}")
            })
            .collect();
        ToolResult::success(blocks.join("\n---\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded_tool() -> (tempfile::TempDir, RagSearchTool) {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("default.jsonl"),
            concat!(
                r#"{"text": "The borrow checker enforces aliasing rules in rust", "source": "notes.md"}"#,
                "\n",
                r#"{"text": "Paris is the capital of France", "source": "geo.md"}"#,
                "\n",
                "{broken line\n",
                r#"{"text": "rust ownership and borrowing rules explained", "source": "book.md"}"#,
                "\n",
            ),
        )
        .unwrap();
        let tool = RagSearchTool::new(dir.path().to_path_buf());
        (dir, tool)
    }

    #[tokio::test]
    async fn ranks_by_term_overlap() {
        let (_dir, tool) = seeded_tool();
        let result = tool
            .execute(serde_json::json!({"query": "rust borrowing rules"}))
            .await;
        assert!(result.success);
        // The doc matching all three terms ranks first.
        let first_block = result.output.split("---").next().unwrap();
        assert!(first_block.contains("book.md"), "{}", result.output);
        assert!(!result.output.contains("Paris"));
    }

    #[tokio::test]
    async fn missing_collection_is_no_results() {
        let (_dir, tool) = seeded_tool();
        let result = tool
            .execute(serde_json::json!({"query": "rust", "collection": "nope"}))
            .await;
        assert!(result.success);
        assert!(result.output.contains("No relevant documents"));
    }

    #[tokio::test]
    async fn top_k_limits_results() {
        let (_dir, tool) = seeded_tool();
        let result = tool
            .execute(serde_json::json!({"query": "rust", "top_k": 1}))
            .await;
        assert!(result.success);
        assert_eq!(result.output.matches("score").count(), 1);
    }
}
