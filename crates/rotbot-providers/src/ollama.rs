//! Local Ollama backend — newline-delimited JSON streaming over `/api/chat`.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use rotbot_core::config::{ModelTable, ProviderConfig};

use crate::guardrail::guarded_system_content;
use crate::provider::{
    ChatRequest, FinishReason, LlmProvider, LlmResponse, ProviderError, Role, StreamEvent,
};

const REQUEST_TIMEOUT_SECS: u64 = 180;
const NUM_CTX: u32 = 4096;

pub struct OllamaProvider {
    client: reqwest::Client,
    base_url: String,
    default_model: String,
    models: ModelTable,
}

impl OllamaProvider {
    pub fn new(config: &ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
            base_url: config
                .base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            default_model: config.default_model.clone(),
            models: config.models.clone(),
        }
    }

    /// Pre-load a model into VRAM so the first reply is instant.
    pub async fn keep_alive(&self, model: Option<&str>) {
        let use_model = model.unwrap_or(&self.default_model);
        let body = serde_json::json!({
            "model": use_model,
            "prompt": "",
            "keep_alive": "10m",
        });
        match self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await
        {
            Ok(_) => debug!(model = use_model, "pre-loaded model"),
            Err(e) => warn!(model = use_model, error = %e, "keep-alive failed"),
        }
    }

    /// An empty request model means "use the configured default".
    fn resolve_model(&self, requested: &str) -> String {
        if requested.is_empty() {
            self.default_model.clone()
        } else {
            requested.to_string()
        }
    }

    /// The model configured for a mode slot, falling back to the default.
    pub fn model_for_mode(&self, mode: &str) -> &str {
        let slot = match mode {
            "coding" => self.models.coding.as_deref(),
            "reasoning" => self.models.reasoning.as_deref(),
            "vision" => self.models.vision.as_deref(),
            _ => None,
        };
        slot.unwrap_or(&self.default_model)
    }
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, req: &ChatRequest) -> Result<LlmResponse, ProviderError> {
        let model = self.resolve_model(&req.model);
        let body = build_request_body(req, &model, false);
        let url = format!("{}/api/chat", self.base_url);

        debug!(model = %model, "sending request to Ollama");

        let resp = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(connect_error)?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Ollama API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(LlmResponse {
            content: api_resp.message.content.trim().to_string(),
            tool_calls: Vec::new(),
            finish_reason: FinishReason::Stop,
            model: api_resp.model,
            tokens_in: api_resp.prompt_eval_count.unwrap_or(0),
            tokens_out: api_resp.eval_count.unwrap_or(0),
        })
    }

    async fn stream_generate(&self, req: &ChatRequest, tx: mpsc::Sender<StreamEvent>) {
        let model = self.resolve_model(&req.model);
        let body = build_request_body(req, &model, true);
        let url = format!("{}/api/chat", self.base_url);

        debug!(model = %model, "sending streaming request to Ollama");

        let resp = match self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                let message = if e.is_connect() || e.is_timeout() {
                    "Cannot connect to Ollama. Make sure it's running.".to_string()
                } else {
                    e.to_string()
                };
                let _ = tx.send(StreamEvent::Error { message }).await;
                return;
            }
        };

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "Ollama streaming API error");
            let _ = tx
                .send(StreamEvent::Error {
                    message: format!("API Error ({status}): {text}"),
                })
                .await;
            return;
        }

        process_stream(resp, req.model.clone(), tx).await;
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let resp = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(connect_error)?;
        if !resp.status().is_success() {
            return Ok(Vec::new());
        }
        let tags: TagsResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    fn supports_vision(&self) -> bool {
        self.models.vision.is_some()
    }
}

fn connect_error(e: reqwest::Error) -> ProviderError {
    if e.is_connect() || e.is_timeout() {
        ProviderError::Unavailable(e.to_string())
    } else {
        ProviderError::Http(e)
    }
}

fn build_request_body(req: &ChatRequest, model: &str, stream: bool) -> serde_json::Value {
    // Same messages array shape as OpenAI. The safety directive rides on
    // every system message.
    let messages: Vec<serde_json::Value> = req
        .messages
        .iter()
        .map(|m| {
            let content = if m.role == Role::System {
                guarded_system_content(&m.content)
            } else {
                m.content.clone()
            };
            serde_json::json!({ "role": m.role, "content": content })
        })
        .collect();

    serde_json::json!({
        "model": model,
        "messages": messages,
        "stream": stream,
        "options": {
            "temperature": req.temperature,
            "num_predict": req.max_tokens,
            "num_ctx": NUM_CTX,
        },
    })
}

/// Parse Ollama's newline-delimited JSON stream. Each line is a JSON object;
/// the final line has `done: true` and carries the token counts.
async fn process_stream(resp: reqwest::Response, req_model: String, tx: mpsc::Sender<StreamEvent>) {
    use futures_util::StreamExt;

    let mut model = req_model;
    let mut tokens_in: u32 = 0;
    let mut tokens_out: u32 = 0;
    let mut line_buf = String::new();

    let mut byte_stream = resp.bytes_stream();

    while let Some(chunk) = byte_stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        let text = match std::str::from_utf8(&chunk) {
            Ok(t) => t,
            Err(_) => continue,
        };

        line_buf.push_str(text);
        let lines: Vec<&str> = line_buf.split('\n').collect();
        let (complete, remainder) = lines.split_at(lines.len() - 1);
        let remainder = remainder.first().unwrap_or(&"").to_string();

        for line in complete {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let chunk_data: ChunkLine = match serde_json::from_str(line) {
                Ok(d) => d,
                Err(e) => {
                    warn!(line, err = %e, "failed to parse Ollama stream chunk");
                    continue;
                }
            };

            if let Some(err) = chunk_data.error {
                let _ = tx.send(StreamEvent::Error { message: err }).await;
                return;
            }

            if let Some(m) = chunk_data.model {
                model = m;
            }

            if chunk_data.done {
                tokens_in = chunk_data.prompt_eval_count.unwrap_or(0);
                tokens_out = chunk_data.eval_count.unwrap_or(0);
                // A final line may still carry trailing content.
                if let Some(msg) = chunk_data.message {
                    if !msg.content.is_empty() {
                        let _ = tx.send(StreamEvent::Delta { text: msg.content }).await;
                    }
                }
                let _ = tx
                    .send(StreamEvent::Done {
                        model: model.clone(),
                        tokens_in,
                        tokens_out,
                        finish_reason: FinishReason::from_wire(
                            chunk_data.done_reason.as_deref().unwrap_or("stop"),
                        ),
                    })
                    .await;
                return;
            }

            if let Some(msg) = chunk_data.message {
                if !msg.content.is_empty() {
                    if tx
                        .send(StreamEvent::Delta { text: msg.content })
                        .await
                        .is_err()
                    {
                        return; // receiver dropped
                    }
                }
            }
        }

        line_buf = remainder;
    }

    // The connection ended without a done line — close the stream cleanly.
    let _ = tx
        .send(StreamEvent::Done {
            model,
            tokens_in,
            tokens_out,
            finish_reason: FinishReason::Stop,
        })
        .await;
}

// Ollama API response types (deserialization only)

#[derive(Deserialize)]
struct ApiResponse {
    model: String,
    message: OllamaMessage,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
}

#[derive(Deserialize)]
struct OllamaMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct ChunkLine {
    model: Option<String>,
    message: Option<OllamaMessage>,
    #[serde(default)]
    done: bool,
    done_reason: Option<String>,
    prompt_eval_count: Option<u32>,
    eval_count: Option<u32>,
    error: Option<String>,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Deserialize)]
struct TagEntry {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ChatMessage;

    fn provider() -> OllamaProvider {
        OllamaProvider::new(&ProviderConfig {
            base_url: Some("http://localhost:11434".to_string()),
            api_base: None,
            api_key: String::new(),
            default_model: "llama3.1:8b".to_string(),
            models: ModelTable {
                coding: Some("qwen2.5-coder:7b".to_string()),
                reasoning: None,
                vision: None,
            },
        })
    }

    #[test]
    fn request_body_injects_safety_directive_into_system() {
        let req = ChatRequest::new(
            "llama3.1:8b",
            vec![
                ChatMessage::system("You are rotbot."),
                ChatMessage::user("hi"),
            ],
        );
        let body = build_request_body(&req, "llama3.1:8b", true);
        let system = body["messages"][0]["content"].as_str().unwrap();
        assert!(system.starts_with("You are rotbot."));
        assert!(system.contains("ABSOLUTE RULES"));
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert_eq!(user, "hi");
        assert_eq!(body["options"]["num_predict"], 1024);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn model_for_mode_falls_back_to_default() {
        let p = provider();
        assert_eq!(p.model_for_mode("coding"), "qwen2.5-coder:7b");
        assert_eq!(p.model_for_mode("reasoning"), "llama3.1:8b");
        assert_eq!(p.model_for_mode("general"), "llama3.1:8b");
    }

    #[test]
    fn chunk_line_parses_done_and_delta() {
        let delta: ChunkLine =
            serde_json::from_str(r#"{"model":"m","message":{"content":"he"},"done":false}"#)
                .unwrap();
        assert!(!delta.done);
        assert_eq!(delta.message.unwrap().content, "he");

        let done: ChunkLine = serde_json::from_str(
            r#"{"model":"m","message":{"content":""},"done":true,"done_reason":"stop","prompt_eval_count":10,"eval_count":5}"#,
        )
        .unwrap();
        assert!(done.done);
        assert_eq!(done.prompt_eval_count, Some(10));
    }
}
