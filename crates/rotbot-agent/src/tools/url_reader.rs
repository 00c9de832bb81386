//! URL reader — fetch a web page and return its readable text.

use std::time::Duration;

use async_trait::async_trait;

use super::{Tool, ToolResult};

const FETCH_TIMEOUT_SECS: u64 = 30;
const MAX_TEXT_CHARS: usize = 8000;
const RENDER_WIDTH: usize = 100;

pub struct UrlReaderTool {
    client: reqwest::Client,
}

impl UrlReaderTool {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
                .user_agent("rotbot/0.1")
                .build()
                .unwrap_or_default(),
        }
    }
}

impl Default for UrlReaderTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for UrlReaderTool {
    fn name(&self) -> &str {
        "url_reader"
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its readable text content. \
         Use this when the user shares a link or asks about a specific page."
    }

    fn parameters(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The http(s) URL to fetch",
                },
            },
            "required": ["url"],
        })
    }

    async fn execute(&self, params: serde_json::Value) -> ToolResult {
        let Some(url) = params.get("url").and_then(|u| u.as_str()) else {
            return ToolResult::error("Error: No URL provided");
        };
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return ToolResult::error("Error: Only http(s) URLs are supported");
        }

        let resp = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return ToolResult::error(format!("Error fetching {url}: {e}")),
        };
        if !resp.status().is_success() {
            return ToolResult::error(format!("Error fetching {url}: HTTP {}", resp.status()));
        }

        let is_html = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("html"))
            .unwrap_or(true);

        let body = match resp.text().await {
            Ok(b) => b,
            Err(e) => return ToolResult::error(format!("Error reading body: {e}")),
        };

        let text = if is_html {
            html2text::from_read(body.as_bytes(), RENDER_WIDTH)
        } else {
            body
        };

        let text = text.trim();
        if text.is_empty() {
            return ToolResult::error(format!("No readable text at {url}"));
        }
        if text.chars().count() > MAX_TEXT_CHARS {
            let truncated: String = text.chars().take(MAX_TEXT_CHARS).collect();
            ToolResult::success(truncated + "\n... (truncated)")
        } else {
            ToolResult::success(text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_non_http_schemes() {
        let tool = UrlReaderTool::new();
        let result = tool
            .execute(serde_json::json!({"url": "file:///etc/passwd"}))
            .await;
        assert!(!result.success);
        assert!(result.output.contains("http(s)"));
    }

    #[tokio::test]
    async fn missing_url_is_an_error() {
        let tool = UrlReaderTool::new();
        let result = tool.execute(serde_json::json!({})).await;
        assert!(!result.success);
    }
}
