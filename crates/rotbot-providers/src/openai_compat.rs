//! OpenAI-compatible backend — SSE chat-completions protocol.
//!
//! BYOK provider: works with OpenAI, Anthropic (OpenAI proxy), Gemini,
//! DeepSeek, Groq, OpenRouter, vLLM, LM Studio, and any other endpoint that
//! speaks `POST /chat/completions` with `data:` event lines and a
//! `data: [DONE]` terminator.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use rotbot_core::config::ProviderConfig;

use crate::guardrail::guarded_system_content;
use crate::provider::{
    ChatRequest, FinishReason, LlmProvider, LlmResponse, ProviderError, Role, StreamEvent,
    ToolCall,
};

const REQUEST_TIMEOUT_SECS: u64 = 180;

/// Default API bases for known provider names.
pub const KNOWN_PROVIDERS: &[(&str, &str)] = &[
    ("openai", "https://api.openai.com/v1"),
    ("anthropic", "https://api.anthropic.com/v1"),
    ("gemini", "https://generativelanguage.googleapis.com/v1beta/openai"),
    ("deepseek", "https://api.deepseek.com/v1"),
    ("groq", "https://api.groq.com/openai/v1"),
    ("openrouter", "https://openrouter.ai/api/v1"),
    ("siliconflow", "https://api.siliconflow.cn/v1"),
    ("minimax", "https://api.minimax.chat/v1"),
    ("moonshot", "https://api.moonshot.cn/v1"),
    ("dashscope", "https://dashscope.aliyuncs.com/compatible-mode/v1"),
];

pub struct OpenAiCompatProvider {
    client: reqwest::Client,
    provider_name: String,
    api_key: String,
    api_base: String,
    default_model: String,
}

impl OpenAiCompatProvider {
    /// `name` doubles as the lookup key for a known API base when the config
    /// leaves `api_base` unset.
    pub fn new(name: &str, config: &ProviderConfig) -> Self {
        let api_base = config
            .api_base
            .clone()
            .or_else(|| known_base_url(name).map(String::from))
            .unwrap_or_default();
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .unwrap_or_default(),
            provider_name: name.to_string(),
            api_key: config.api_key.clone(),
            api_base,
            default_model: config.default_model.clone(),
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
}

pub fn known_base_url(name: &str) -> Option<&'static str> {
    KNOWN_PROVIDERS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, url)| *url)
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn generate(&self, req: &ChatRequest) -> Result<LlmResponse, ProviderError> {
        let model = self.resolve_model(&req.model);
        let body = build_request_body(req, &model, false);
        let url = format!("{}/chat/completions", self.api_base);

        debug!(model = %model, provider = %self.provider_name, "sending chat request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    ProviderError::Unavailable(format!("Cannot connect to {}", self.api_base))
                } else {
                    ProviderError::Http(e)
                }
            })?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(status, body = %text, "chat-completions API error");
            return Err(ProviderError::Api {
                status,
                message: text,
            });
        }

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(parse_response(api_resp, &model))
    }

    async fn stream_generate(&self, req: &ChatRequest, tx: mpsc::Sender<StreamEvent>) {
        let model = self.resolve_model(&req.model);
        let body = build_request_body(req, &model, true);
        let url = format!("{}/chat/completions", self.api_base);

        debug!(model = %model, provider = %self.provider_name, "sending streaming chat request");

        let resp = match self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                let message = if e.is_connect() || e.is_timeout() {
                    format!("Cannot connect to {}", self.api_base)
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
            warn!(status, body = %text, "chat-completions streaming API error");
            let _ = tx
                .send(StreamEvent::Error {
                    message: format!("API Error ({status}): {text}"),
                })
                .await;
            return;
        }

        process_sse_stream(resp, model, tx).await;
    }

    async fn list_models(&self) -> Result<Vec<String>, ProviderError> {
        let resp = self
            .client
            .get(format!("{}/models", self.api_base))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Ok(Vec::new());
        }
        let models: ModelsResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;
        Ok(models.data.into_iter().map(|m| m.id).collect())
    }

    fn supports_tools(&self) -> bool {
        true
    }
}

fn build_request_body(req: &ChatRequest, model: &str, stream: bool) -> serde_json::Value {
    let messages: Vec<serde_json::Value> = req.messages.iter().map(wire_message).collect();

    let mut body = serde_json::json!({
        "model": model,
        "messages": messages,
        "temperature": req.temperature,
        "max_tokens": req.max_tokens,
        "stream": stream,
    });

    if !req.tools.is_empty() {
        let tools: Vec<serde_json::Value> = req
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
        body["tools"] = serde_json::json!(tools);
    }

    body
}

/// Convert one [`ChatMessage`](crate::ChatMessage) to its wire shape,
/// injecting the safety directive into system messages and expanding
/// assistant tool calls / tool results into OpenAI's format.
fn wire_message(m: &crate::ChatMessage) -> serde_json::Value {
    match m.role {
        Role::System => serde_json::json!({
            "role": "system",
            "content": guarded_system_content(&m.content),
        }),
        Role::Tool => serde_json::json!({
            "role": "tool",
            "tool_call_id": m.tool_call_id.as_deref().unwrap_or(""),
            "content": m.content,
        }),
        Role::Assistant if !m.tool_calls.is_empty() => {
            let calls: Vec<serde_json::Value> = m
                .tool_calls
                .iter()
                .map(|c| {
                    serde_json::json!({
                        "id": c.id,
                        "type": "function",
                        "function": {
                            "name": c.name,
                            "arguments": c.arguments.to_string(),
                        }
                    })
                })
                .collect();
            let content = if m.content.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::Value::String(m.content.clone())
            };
            serde_json::json!({
                "role": "assistant",
                "content": content,
                "tool_calls": calls,
            })
        }
        _ => serde_json::json!({ "role": m.role, "content": m.content }),
    }
}

fn parse_response(resp: ApiResponse, req_model: &str) -> LlmResponse {
    let model = if resp.model.is_empty() {
        req_model.to_string()
    } else {
        resp.model
    };
    let choice = resp.choices.into_iter().next();

    let content = choice
        .as_ref()
        .and_then(|c| c.message.content.clone())
        .unwrap_or_default();

    let tool_calls: Vec<ToolCall> = choice
        .as_ref()
        .and_then(|c| c.message.tool_calls.as_ref())
        .map(|calls| calls.iter().map(api_tool_call).collect())
        .unwrap_or_default();

    let finish_reason = choice
        .and_then(|c| c.finish_reason)
        .map(|r| FinishReason::from_wire(&r))
        .unwrap_or(FinishReason::Stop);

    LlmResponse {
        content,
        tool_calls,
        finish_reason,
        model,
        tokens_in: resp.usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
        tokens_out: resp
            .usage
            .as_ref()
            .map(|u| u.completion_tokens)
            .unwrap_or(0),
    }
}

fn api_tool_call(tc: &ApiToolCall) -> ToolCall {
    let arguments: serde_json::Value =
        serde_json::from_str(&tc.function.arguments).unwrap_or_default();
    ToolCall {
        id: tc.id.clone(),
        name: tc.function.name.clone(),
        arguments,
    }
}

/// Parse the SSE stream: `data: {json}` deltas, `data: [DONE]` terminator.
///
/// Tool-call fragments arrive spread over many deltas (`index` keyed, with
/// `arguments` as string pieces); they are assembled here and emitted as
/// complete `ToolUse` events just before `Done`.
async fn process_sse_stream(resp: reqwest::Response, req_model: String, tx: mpsc::Sender<StreamEvent>) {
    use futures_util::StreamExt;

    let mut model = req_model;
    let mut tokens_in: u32 = 0;
    let mut tokens_out: u32 = 0;
    let mut finish_raw = String::new();
    let mut line_buf = String::new();
    // index → (id, name, argument fragments)
    let mut pending_calls: BTreeMap<u32, (String, String, String)> = BTreeMap::new();
    let mut done = false;

    let mut byte_stream = resp.bytes_stream();

    'outer: while let Some(chunk) = byte_stream.next().await {
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
            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };

            if data.trim() == "[DONE]" {
                done = true;
                break 'outer;
            }

            let Ok(delta_resp) = serde_json::from_str::<SseChunk>(data) else {
                continue;
            };

            if let Some(m) = delta_resp.model {
                if !m.is_empty() {
                    model = m;
                }
            }
            if let Some(usage) = &delta_resp.usage {
                tokens_in = usage.prompt_tokens;
                tokens_out = usage.completion_tokens;
            }

            for choice in &delta_resp.choices {
                if let Some(reason) = &choice.finish_reason {
                    if !reason.is_empty() {
                        finish_raw = reason.clone();
                    }
                }
                if let Some(content) = &choice.delta.content {
                    if !content.is_empty() {
                        debug!(len = content.len(), "sse stream text delta");
                        if tx
                            .send(StreamEvent::Delta {
                                text: content.clone(),
                            })
                            .await
                            .is_err()
                        {
                            return; // receiver dropped
                        }
                    }
                }
                if let Some(fragments) = &choice.delta.tool_calls {
                    for frag in fragments {
                        let entry = pending_calls.entry(frag.index).or_default();
                        if let Some(id) = &frag.id {
                            entry.0 = id.clone();
                        }
                        if let Some(f) = &frag.function {
                            if let Some(name) = &f.name {
                                entry.1.push_str(name);
                            }
                            if let Some(args) = &f.arguments {
                                entry.2.push_str(args);
                            }
                        }
                    }
                }
            }
        }

        line_buf = remainder;
    }

    if !done && finish_raw.is_empty() {
        // The connection dropped before a terminator arrived.
        let _ = tx
            .send(StreamEvent::Error {
                message: "stream ended unexpectedly".to_string(),
            })
            .await;
        return;
    }

    for (_, (id, name, args)) in pending_calls {
        let arguments: serde_json::Value = serde_json::from_str(&args).unwrap_or_default();
        let _ = tx
            .send(StreamEvent::ToolUse(ToolCall {
                id,
                name,
                arguments,
            }))
            .await;
    }

    let _ = tx
        .send(StreamEvent::Done {
            model,
            tokens_in,
            tokens_out,
            finish_reason: FinishReason::from_wire(&finish_raw),
        })
        .await;
}

// API response types (deserialization only)

#[derive(Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ApiMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ApiMessage {
    content: Option<String>,
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Deserialize)]
struct ApiToolCall {
    id: String,
    function: ApiFunction,
}

#[derive(Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}

// Streaming chunk types

#[derive(Deserialize)]
struct SseChunk {
    model: Option<String>,
    #[serde(default)]
    choices: Vec<SseChoice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct SseChoice {
    delta: SseDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct SseDelta {
    content: Option<String>,
    tool_calls: Option<Vec<SseToolCallFragment>>,
}

#[derive(Deserialize)]
struct SseToolCallFragment {
    #[serde(default)]
    index: u32,
    id: Option<String>,
    function: Option<SseFunctionFragment>,
}

#[derive(Deserialize)]
struct SseFunctionFragment {
    name: Option<String>,
    arguments: Option<String>,
}
