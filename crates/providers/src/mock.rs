//! Deterministic offline provider.
//!
//! Stands in for a real vendor when no API key is configured so the whole
//! stack (Reactor, session commands, HTTP API, chat UI) stays usable.

use async_trait::async_trait;
use miniluma_core::error::ProviderError;
use miniluma_core::message::Message;
use miniluma_core::provider::*;
use std::time::Duration;

const MOCK_NOTICE: &str = "This reply comes from the built-in mock provider because no API key \
is configured. It only echoes your input so the system can be exercised end to end.";

const TRUNCATION_MARKER: &str = "...(max token limit reached)";

/// A provider that answers without any network access.
#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    delay: Option<Duration>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep before every reply, to make progress indicators visible.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// The text the user actually asked for.
    ///
    /// Reasoning prompts embed it on a `User request:` line; plain chat
    /// requests carry it as the last user message.
    fn user_request(request: &ProviderRequest) -> String {
        let Some(last) = request.last_user_input() else {
            return "(no input provided)".into();
        };
        last.lines()
            .find_map(|line| line.trim().strip_prefix("User request:"))
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|| last.to_string())
    }

    fn compose(input: &str) -> String {
        let mut reply = format!("{MOCK_NOTICE}\n\nYou said: '{input}'");
        let lower = input.to_lowercase();

        if lower.contains("code") || lower.contains("file") {
            reply.push_str(
                "\n\nHere is an example Python script:\n\n```python\ndef hello_world():\n    print(\"Hello from MiniLuma\")\n\nhello_world()\n```",
            );
        }

        if lower.contains("help") {
            reply.push_str(
                "\n\n## Features\n\n- Conversation with memory\n- Code generation and file saving\n- Web search and page fetching\n- Tool calling through the Reactor",
            );
        }

        reply
    }

    /// Cut the reply to `max_tokens` at two characters per token.
    fn apply_token_limit(reply: String, max_tokens: Option<u32>) -> String {
        let Some(max_tokens) = max_tokens else {
            return reply;
        };
        let max_chars = max_tokens as usize * 2;
        if reply.chars().count() <= max_chars {
            return reply;
        }
        let mut cut: String = reply.chars().take(max_chars).collect();
        cut.push_str(TRUNCATION_MARKER);
        cut
    }
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let input = Self::user_request(&request);
        let reply = Self::apply_token_limit(Self::compose(&input), request.max_tokens);

        // With tools on offer the caller is a Reactor expecting an action.
        let content = if request.tools.is_empty() {
            reply
        } else {
            serde_json::json!({
                "action_type": "final_response",
                "reasoning": "Mock provider answers directly without using tools.",
                "response": reply,
            })
            .to_string()
        };

        let prompt_chars: usize = request.messages.iter().map(|m| m.content.len()).sum();
        let prompt_tokens = (prompt_chars / 4) as u32;
        let completion_tokens = (content.len() / 4) as u32;

        Ok(ProviderResponse {
            message: Message::assistant(content),
            usage: Some(Usage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            }),
            model: if request.model.is_empty() {
                "mock-model".into()
            } else {
                request.model
            },
            metadata: serde_json::Map::new(),
        })
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        Ok(vec!["mock-model".into()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miniluma_core::provider::ToolDefinition;

    fn request(input: &str) -> ProviderRequest {
        ProviderRequest::new("mock-model", vec![Message::system("rules"), Message::user(input)])
    }

    #[tokio::test]
    async fn echoes_input_with_notice() {
        let resp = MockProvider::new().complete(request("hello there")).await.unwrap();
        assert!(resp.message.content.contains("mock provider"));
        assert!(resp.message.content.contains("'hello there'"));
        assert!(!resp.message.content.contains("```python"));
    }

    #[tokio::test]
    async fn code_keyword_adds_python_block() {
        let resp = MockProvider::new().complete(request("write some Code please")).await.unwrap();
        assert!(resp.message.content.contains("```python\ndef hello_world():"));
    }

    #[tokio::test]
    async fn help_keyword_adds_feature_list() {
        let resp = MockProvider::new().complete(request("help")).await.unwrap();
        assert!(resp.message.content.contains("## Features"));
    }

    #[tokio::test]
    async fn max_tokens_truncates() {
        let mut req = request("hello");
        req.max_tokens = Some(10);
        let resp = MockProvider::new().complete(req).await.unwrap();
        assert!(resp.message.content.ends_with(TRUNCATION_MARKER));
        assert_eq!(
            resp.message.content.chars().count(),
            20 + TRUNCATION_MARKER.chars().count()
        );
    }

    #[tokio::test]
    async fn tools_produce_final_response_action() {
        let mut req = ProviderRequest::new(
            "mock-model",
            vec![Message::user("Available tools:\n- x\n\nUser request: what is rust\n\nCurrent iteration: 1")],
        );
        req.tools = vec![ToolDefinition {
            name: "web_search".into(),
            description: "search".into(),
            parameters: serde_json::json!({"type": "object"}),
        }];
        let resp = MockProvider::new().complete(req).await.unwrap();
        let action: serde_json::Value = serde_json::from_str(&resp.message.content).unwrap();
        assert_eq!(action["action_type"], "final_response");
        assert!(action["response"].as_str().unwrap().contains("'what is rust'"));
    }

    #[tokio::test]
    async fn default_stream_yields_one_chunk() {
        let mut rx = MockProvider::new().stream(request("hi")).await.unwrap();
        let chunk = rx.recv().await.unwrap().unwrap();
        assert!(chunk.done);
        assert!(chunk.content.unwrap().contains("'hi'"));
    }
}
