//! Anthropic Messages API adapter.
//!
//! Differs from the OpenAI shape in a few places:
//! - `x-api-key` and `anthropic-version` headers instead of Bearer auth
//! - system prompt as a top-level field
//! - tool calls and results as `tool_use` / `tool_result` content blocks
//! - typed SSE events (`content_block_start`, `content_block_delta`, ...)

use async_trait::async_trait;
use futures::StreamExt;
use miniluma_core::error::ProviderError;
use miniluma_core::message::{Message, MessageToolCall, Role};
use miniluma_core::provider::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::openai_compat::map_status;

const ANTHROPIC_VERSION: &str = "2023-06-01";
pub const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: ANTHROPIC_BASE_URL.into(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Point the adapter at a proxy or test server.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Split system messages out of the conversation; several are joined
    /// with a blank line.
    fn extract_system(messages: &[Message]) -> (Option<String>, Vec<&Message>) {
        let (system, rest): (Vec<&Message>, Vec<&Message>) =
            messages.iter().partition(|m| m.role == Role::System);

        let system = (!system.is_empty()).then(|| {
            system
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n\n")
        });
        (system, rest)
    }

    fn to_api_messages(messages: &[&Message]) -> Vec<AnthropicMessage> {
        messages
            .iter()
            .filter_map(|msg| match msg.role {
                Role::User => Some(AnthropicMessage::text("user", &msg.content)),
                Role::Assistant if msg.tool_calls.is_empty() => {
                    Some(AnthropicMessage::text("assistant", &msg.content))
                }
                Role::Assistant => {
                    let mut blocks = Vec::with_capacity(msg.tool_calls.len() + 1);
                    if !msg.content.is_empty() {
                        blocks.push(ContentBlock::Text {
                            text: msg.content.clone(),
                        });
                    }
                    blocks.extend(msg.tool_calls.iter().map(|tc| ContentBlock::ToolUse {
                        id: tc.id.clone(),
                        name: tc.name.clone(),
                        input: serde_json::from_str(&tc.arguments)
                            .unwrap_or_else(|_| serde_json::json!({})),
                    }));
                    Some(AnthropicMessage {
                        role: "assistant".into(),
                        content: AnthropicContent::Blocks(blocks),
                    })
                }
                Role::Tool => Some(AnthropicMessage {
                    role: "user".into(),
                    content: AnthropicContent::Blocks(vec![ContentBlock::ToolResult {
                        tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                        content: msg.content.clone(),
                    }]),
                }),
                Role::System => None,
            })
            .collect()
    }

    fn request_body(request: &ProviderRequest, stream: bool) -> serde_json::Value {
        let (system, messages) = Self::extract_system(&request.messages);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&messages),
            "max_tokens": request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            "temperature": request.temperature,
        });

        if stream {
            body["stream"] = serde_json::json!(true);
        }
        if let Some(sys) = system {
            body["system"] = serde_json::json!(sys);
        }
        if !request.tools.is_empty() {
            let tools: Vec<AnthropicTool> = request
                .tools
                .iter()
                .map(|t| AnthropicTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.parameters.clone(),
                })
                .collect();
            body["tools"] = serde_json::json!(tools);
        }
        if !request.stop.is_empty() {
            body["stop_sequences"] = serde_json::json!(request.stop);
        }
        body
    }

    async fn post_messages(
        &self,
        body: &serde_json::Value,
    ) -> std::result::Result<reqwest::Response, ProviderError> {
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let error_body = response.text().await.unwrap_or_default();
        warn!(status, body = %error_body, "Anthropic API error");
        Err(map_status(status, error_body))
    }

    fn into_provider_response(resp: AnthropicResponse) -> ProviderResponse {
        let mut texts = Vec::new();
        let mut tool_calls = Vec::new();

        for block in resp.content {
            match block {
                ResponseContentBlock::Text { text } => texts.push(text),
                ResponseContentBlock::ToolUse { id, name, input } => tool_calls.push(MessageToolCall {
                    id,
                    name,
                    arguments: input.to_string(),
                }),
                ResponseContentBlock::Other => {}
            }
        }

        let mut message = Message::assistant(texts.join("\n"));
        message.tool_calls = tool_calls;

        let mut metadata = serde_json::Map::new();
        metadata.insert("id".into(), serde_json::json!(resp.id));
        if let Some(reason) = resp.stop_reason {
            metadata.insert("stop_reason".into(), serde_json::json!(reason));
        }

        ProviderResponse {
            message,
            usage: Some(Usage {
                prompt_tokens: resp.usage.input_tokens,
                completion_tokens: resp.usage.output_tokens,
                total_tokens: resp.usage.input_tokens + resp.usage.output_tokens,
            }),
            model: resp.model,
            metadata,
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let body = Self::request_body(&request, false);
        debug!(provider = "anthropic", model = %request.model, "Sending completion request");

        let response = self.post_messages(&body).await?;
        let api_resp: AnthropicResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse Anthropic response: {e}"))
        })?;

        Ok(Self::into_provider_response(api_resp))
    }

    async fn stream(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<
        tokio::sync::mpsc::Receiver<std::result::Result<StreamChunk, ProviderError>>,
        ProviderError,
    > {
        let body = Self::request_body(&request, true);
        debug!(provider = "anthropic", model = %request.model, "Sending streaming request");

        let response = self.post_messages(&body).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(64);

        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut buffer = String::new();
            let mut state = EventState::default();

            while let Some(next) = byte_stream.next().await {
                let bytes = match next {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(ProviderError::StreamInterrupted(e.to_string()))).await;
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&bytes));

                while let Some(line_end) = buffer.find('\n') {
                    let line: String = buffer.drain(..=line_end).collect();
                    let Some(data) = line.trim_end().strip_prefix("data:") else {
                        continue;
                    };
                    let event: serde_json::Value = match serde_json::from_str(data.trim()) {
                        Ok(v) => v,
                        Err(e) => {
                            trace!(error = %e, "Ignoring unparseable Anthropic SSE");
                            continue;
                        }
                    };
                    if let Some(chunk) = state.handle_event(&event) {
                        let done = chunk.done;
                        if tx.send(Ok(chunk)).await.is_err() || done {
                            return;
                        }
                    }
                }
            }

            let _ = tx.send(Ok(state.finish())).await;
        });

        Ok(rx)
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        let response = self
            .client
            .get(format!("{}/models", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Ok(Vec::new());
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        Ok(body["data"]
            .as_array()
            .map(|arr| arr.iter().filter_map(|m| m["id"].as_str().map(String::from)).collect())
            .unwrap_or_default())
    }
}

/// Accumulates one streamed message from typed Anthropic events.
#[derive(Default)]
struct EventState {
    current: Option<MessageToolCall>,
    tool_calls: Vec<MessageToolCall>,
    usage: Option<Usage>,
}

impl EventState {
    fn close_tool(&mut self) {
        if let Some(call) = self.current.take() {
            self.tool_calls.push(call);
        }
    }

    fn handle_event(&mut self, event: &serde_json::Value) -> Option<StreamChunk> {
        match event["type"].as_str().unwrap_or_default() {
            "content_block_start" => {
                let block = &event["content_block"];
                if block["type"] == "tool_use" {
                    self.close_tool();
                    self.current = Some(MessageToolCall {
                        id: block["id"].as_str().unwrap_or_default().to_string(),
                        name: block["name"].as_str().unwrap_or_default().to_string(),
                        arguments: String::new(),
                    });
                }
                None
            }
            "content_block_delta" => {
                let delta = &event["delta"];
                match delta["type"].as_str() {
                    Some("text_delta") => delta["text"].as_str().map(|text| StreamChunk {
                        content: Some(text.to_string()),
                        tool_calls: Vec::new(),
                        done: false,
                        usage: None,
                    }),
                    Some("input_json_delta") => {
                        if let (Some(call), Some(partial)) =
                            (self.current.as_mut(), delta["partial_json"].as_str())
                        {
                            call.arguments.push_str(partial);
                        }
                        None
                    }
                    _ => None,
                }
            }
            "content_block_stop" => {
                self.close_tool();
                None
            }
            "message_start" => {
                let input = event["message"]["usage"]["input_tokens"].as_u64().unwrap_or(0) as u32;
                self.usage = Some(Usage {
                    prompt_tokens: input,
                    completion_tokens: 0,
                    total_tokens: input,
                });
                None
            }
            "message_delta" => {
                if let Some(out) = event["usage"]["output_tokens"].as_u64() {
                    let usage = self.usage.get_or_insert_with(Usage::default);
                    usage.completion_tokens = out as u32;
                    usage.total_tokens = usage.prompt_tokens + usage.completion_tokens;
                }
                None
            }
            "message_stop" => Some(self.finish()),
            _ => None,
        }
    }

    fn finish(&mut self) -> StreamChunk {
        self.close_tool();
        StreamChunk {
            content: None,
            tool_calls: std::mem::take(&mut self.tool_calls),
            done: true,
            usage: self.usage.take(),
        }
    }
}

// --- Wire types ---

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

impl AnthropicMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.into(),
            content: AnthropicContent::Text(content.into()),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<ResponseContentBlock>,
    usage: AnthropicUsage,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseContentBlock {
    Text { text: String },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}
