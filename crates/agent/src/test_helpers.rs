//! Shared test helpers for Reactor and session tests.

use miniluma_core::error::ProviderError;
use miniluma_core::message::{Message, MessageToolCall};
use miniluma_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::sync::Mutex;

/// A mock provider that returns a sequence of scripted results.
///
/// Each call to `complete` returns the next result in the queue and
/// records the request. Panics if more calls are made than results provided.
pub struct SequentialMockProvider {
    results: Mutex<Vec<Result<ProviderResponse, ProviderError>>>,
    requests: Mutex<Vec<ProviderRequest>>,
}

impl SequentialMockProvider {
    pub fn new(responses: Vec<ProviderResponse>) -> Self {
        Self::with_results(responses.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            results: Mutex::new(results),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider that returns a single text response (no tool calls).
    pub fn single_text(text: &str) -> Self {
        Self::new(vec![make_text_response(text)])
    }

    /// Create a provider that first returns tool calls, then a final answer.
    pub fn tool_then_answer(tool_calls: Vec<MessageToolCall>, thought: &str, answer: &str) -> Self {
        Self::new(vec![make_tool_call_response(tool_calls, thought), make_text_response(answer)])
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// The `n`th request received (0-based).
    pub fn request(&self, n: usize) -> ProviderRequest {
        self.requests.lock().unwrap()[n].clone()
    }
}

#[async_trait::async_trait]
impl Provider for SequentialMockProvider {
    fn name(&self) -> &str {
        "sequential_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut requests = self.requests.lock().unwrap();
        let results = self.results.lock().unwrap();
        let n = requests.len();

        if n >= results.len() {
            panic!(
                "SequentialMockProvider: no more responses (call #{}, have {})",
                n,
                results.len()
            );
        }

        requests.push(request);
        results[n].clone()
    }
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// Create a simple text response (no tool calls).
pub fn make_text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: usage(),
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}

/// Create a response with tool calls and optional thought content.
pub fn make_tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    let mut msg = Message::assistant(thought);
    msg.tool_calls = tool_calls;
    ProviderResponse {
        message: msg,
        usage: usage(),
        model: "mock-model".into(),
        metadata: serde_json::Map::new(),
    }
}

/// Helper to create a native tool call.
pub fn make_tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: serde_json::to_string(&args).unwrap(),
    }
}

/// A `tool_use` action in the JSON format the Reactor asks for.
pub fn tool_json(tool: &str, params: serde_json::Value, reasoning: &str) -> String {
    serde_json::json!({
        "action_type": "tool_use",
        "tool_name": tool,
        "tool_params": params,
        "reasoning": reasoning,
    })
    .to_string()
}

/// A `final_response` action in the JSON format the Reactor asks for.
pub fn final_json(response: &str, reasoning: &str) -> String {
    serde_json::json!({
        "action_type": "final_response",
        "response": response,
        "reasoning": reasoning,
    })
    .to_string()
}
