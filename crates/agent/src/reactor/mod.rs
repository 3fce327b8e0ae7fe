//! The Reactor: reason, act, observe, repeat.
//!
//! Each pass asks the model for a JSON action (see [`prompt::ACTION_FORMAT`]).
//! A `tool_use` action runs the tool and records the observation for the
//! next pass; a `final_response` ends the turn. If the iteration budget
//! runs out first, one more request asks the model to answer from what it
//! has observed.
//!
//! The same loop backs [`Reactor::process`] and [`Reactor::process_stream`];
//! the streaming form reports each step as a [`ReactorEvent`].

pub mod action;
pub mod prompt;

pub use action::{IterationRecord, ReactorAction, ToolInvocation};

use crate::stream_event::ReactorEvent;
use crate::working_memory::{TraceEntry, WorkingMemory};
use chrono::Utc;
use miniluma_core::event::{DomainEvent, EventBus};
use miniluma_core::memory::MemoryEntry;
use miniluma_core::message::{Message, Role};
use miniluma_core::provider::{Provider, ProviderRequest};
use miniluma_core::tool::{ToolCall, ToolRegistry};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Result of one Reactor turn.
#[derive(Debug, Clone)]
pub struct ReactorOutcome {
    pub response: String,
    /// Passes used, including the one that produced the answer.
    pub iterations: usize,
    pub history: Vec<IterationRecord>,
    pub tool_invocations: Vec<ToolInvocation>,
    pub trace: Vec<TraceEntry>,
    /// `false` when the answer came from the timeout pass or fallback.
    pub completed: bool,
}

/// The reason-act-observe loop over one provider and one tool registry.
#[derive(Clone)]
pub struct Reactor {
    provider: Arc<dyn Provider>,
    model: String,
    tools: Arc<ToolRegistry>,
    system_prompt: String,
    max_iterations: usize,
    temperature: f32,
    reasoning_max_tokens: u32,
    event_bus: Option<Arc<EventBus>>,
    conversation_id: Option<String>,
}

impl Reactor {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            model: model.into(),
            tools,
            system_prompt: String::new(),
            max_iterations: 10,
            temperature: 0.7,
            reasoning_max_tokens: 1024,
            event_bus: None,
            conversation_id: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_reasoning_max_tokens(mut self, max_tokens: u32) -> Self {
        self.reasoning_max_tokens = max_tokens;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Conversation reported in `ResponseGenerated` events.
    pub fn with_conversation_id(mut self, id: impl Into<String>) -> Self {
        self.conversation_id = Some(id.into());
        self
    }

    /// A copy whose system prompt lists `memories` under `## Recalled Memories`.
    pub fn with_recalled_memories(&self, memories: &[MemoryEntry]) -> Self {
        let mut reactor = self.clone();
        if memories.is_empty() {
            return reactor;
        }
        let mut section = String::from("\n\n## Recalled Memories\n");
        for memory in memories {
            section.push_str(&format!("- {}\n", memory.content));
        }
        reactor.system_prompt.push_str(&section);
        reactor
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn tools(&self) -> &Arc<ToolRegistry> {
        &self.tools
    }

    /// Run one turn to completion.
    pub async fn process(&self, user_input: &str, history: &[Message]) -> miniluma_core::Result<ReactorOutcome> {
        self.drive(user_input, history, None).await
    }

    /// Run one turn, reporting each step on `events`.
    ///
    /// Ends with `response` + `done`, or `error` if the turn fails.
    pub async fn process_with_events(
        &self,
        user_input: &str,
        history: &[Message],
        events: &mpsc::Sender<ReactorEvent>,
    ) -> miniluma_core::Result<ReactorOutcome> {
        let result = self.drive(user_input, history, Some(events)).await;
        if let Err(e) = &result {
            let _ = events.send(ReactorEvent::Error { message: e.to_string() }).await;
        }
        result
    }

    /// Run one turn on a spawned task and stream its events.
    pub fn process_stream(&self, user_input: impl Into<String>, history: Vec<Message>) -> mpsc::Receiver<ReactorEvent> {
        let (tx, rx) = mpsc::channel(64);
        let reactor = self.clone();
        let user_input = user_input.into();
        tokio::spawn(async move {
            let _ = reactor.process_with_events(&user_input, &history, &tx).await;
        });
        rx
    }

    async fn drive(
        &self,
        user_input: &str,
        history: &[Message],
        events: Option<&mpsc::Sender<ReactorEvent>>,
    ) -> miniluma_core::Result<ReactorOutcome> {
        let emit = |event: ReactorEvent| async move {
            if let Some(tx) = events {
                let _ = tx.send(event).await;
            }
        };

        let mut wm = WorkingMemory::new(self.max_iterations);
        let mut records: Vec<IterationRecord> = Vec::new();
        let mut invocations: Vec<ToolInvocation> = Vec::new();
        let mut tokens_used = 0u32;
        let mut final_response = None;
        let context = context_messages(history);

        info!(model = %self.model, provider = %self.provider.name(), max_iter = self.max_iterations, "Reactor turn starting");

        while final_response.is_none() && !wm.is_exhausted() {
            wm.tick();
            let iteration = wm.iterations;
            debug!(iteration, "Reactor iteration");

            let action = self.reason(user_input, &context, &records, iteration, &mut tokens_used).await?;

            if !action.reasoning().is_empty() {
                wm.add_thought(action.reasoning());
                emit(ReactorEvent::Thought {
                    content: action.reasoning().to_string(),
                })
                .await;
            }

            match &action {
                ReactorAction::FinalResponse { response, .. } => {
                    final_response = Some(response.clone());
                }
                ReactorAction::ToolUse {
                    tool_name,
                    tool_params,
                    ..
                } => {
                    emit(ReactorEvent::ToolCall {
                        name: tool_name.clone(),
                        arguments: tool_params.clone(),
                    })
                    .await;
                    wm.add_action(&format!("{tool_name}({tool_params})"));

                    let (observation, invocation) = self.act(tool_name, tool_params, iteration).await;

                    wm.add_observation(&invocation.result);
                    wm.add_tool_result(tool_name, &tool_params.to_string(), &invocation.result, invocation.success);
                    emit(ReactorEvent::ToolResult {
                        name: tool_name.clone(),
                        output: invocation.result.clone(),
                        success: invocation.success,
                    })
                    .await;

                    invocations.push(invocation);
                    records.push(IterationRecord {
                        iteration,
                        thought: action.clone(),
                        observation,
                    });
                }
            }
        }

        let completed = final_response.is_some();
        let response = match final_response {
            Some(response) => response,
            None => {
                warn!(max_iter = self.max_iterations, "Reactor reached max iterations without a final response");
                let response = self.timeout_response(user_input, &records, &mut tokens_used).await;
                wm.add_reflection("Iteration budget exhausted; answered from observations");
                response
            }
        };

        emit(ReactorEvent::Response {
            content: response.clone(),
        })
        .await;
        emit(ReactorEvent::Done {
            iterations: wm.iterations,
        })
        .await;

        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ResponseGenerated {
                conversation_id: self.conversation_id.clone().unwrap_or_default(),
                model: self.model.clone(),
                tokens_used,
                iterations: wm.iterations,
                timestamp: Utc::now(),
            });
        }

        info!(
            iterations = wm.iterations,
            tool_calls = invocations.len(),
            completed,
            "Reactor turn finished"
        );

        Ok(ReactorOutcome {
            response,
            iterations: wm.iterations,
            history: records,
            tool_invocations: invocations,
            trace: wm.trace,
            completed,
        })
    }

    async fn reason(
        &self,
        user_input: &str,
        context: &[Message],
        records: &[IterationRecord],
        iteration: usize,
        tokens_used: &mut u32,
    ) -> miniluma_core::Result<ReactorAction> {
        let definitions = self.tools.definitions();
        let prompt = prompt::reasoning_prompt(&definitions, user_input, records, iteration);

        let system = if self.system_prompt.is_empty() {
            prompt::ACTION_FORMAT.to_string()
        } else {
            format!("{}\n\n{}", prompt::ACTION_FORMAT, self.system_prompt)
        };

        let mut messages = Vec::with_capacity(context.len() + 2);
        messages.push(Message::system(system));
        messages.extend(context.iter().cloned());
        messages.push(Message::user(prompt));

        let mut request = ProviderRequest::new(&self.model, messages);
        request.temperature = self.temperature;
        request.max_tokens = Some(self.reasoning_max_tokens);
        request.tools = definitions;

        let response = self.provider.complete(request).await?;
        if let Some(usage) = &response.usage {
            *tokens_used += usage.total_tokens;
        }

        let action = ReactorAction::from_message(&response.message);
        debug!(?action, "Reactor decided");
        Ok(action)
    }

    async fn act(&self, tool_name: &str, params: &Value, iteration: usize) -> (Value, ToolInvocation) {
        let start = Instant::now();

        let (observation, output, success) = if !self.tools.contains(tool_name) {
            let error = format!("Tool '{tool_name}' not found");
            warn!(tool = %tool_name, "Model asked for an unknown tool");
            (
                json!({ "error": error, "available_tools": self.tools.names() }),
                error,
                false,
            )
        } else {
            let call = ToolCall {
                id: format!("call_{iteration}"),
                name: tool_name.to_string(),
                arguments: params.clone(),
            };
            match self.tools.execute(&call).await {
                Ok(result) if result.success => {
                    (json!({ "result": result.output, "success": true }), result.output, true)
                }
                Ok(result) => {
                    let error = format!("Error executing tool {tool_name}: {}", result.output);
                    (json!({ "error": error, "success": false }), error, false)
                }
                Err(e) => {
                    let error = format!("Error executing tool {tool_name}: {e}");
                    (json!({ "error": error, "success": false }), error, false)
                }
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        debug!(tool = %tool_name, success, duration_ms, "Tool executed");
        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ToolExecuted {
                tool_name: tool_name.to_string(),
                success,
                duration_ms,
                timestamp: Utc::now(),
            });
        }

        let invocation = ToolInvocation {
            name: tool_name.to_string(),
            arguments: params.clone(),
            result: output,
            success,
        };
        (observation, invocation)
    }

    async fn timeout_response(&self, user_input: &str, records: &[IterationRecord], tokens_used: &mut u32) -> String {
        let prompt = prompt::timeout_prompt(self.max_iterations, user_input, records);
        let mut request = ProviderRequest::new(
            &self.model,
            vec![Message::system(self.system_prompt.clone()), Message::user(prompt)],
        );
        request.temperature = self.temperature;
        request.max_tokens = Some(self.reasoning_max_tokens);

        match self.provider.complete(request).await {
            Ok(response) => {
                if let Some(usage) = &response.usage {
                    *tokens_used += usage.total_tokens;
                }
                let content = response.message.content.trim();
                if content.is_empty() {
                    prompt::FALLBACK_RESPONSE.to_string()
                } else {
                    content.to_string()
                }
            }
            Err(e) => {
                warn!(error = %e, "Timeout response failed");
                prompt::FALLBACK_RESPONSE.to_string()
            }
        }
    }
}

/// Conversation context for the provider: user, assistant and system
/// messages only, with tool-call plumbing stripped so any vendor accepts it.
fn context_messages(history: &[Message]) -> Vec<Message> {
    history
        .iter()
        .filter(|m| m.role != Role::Tool && !m.content.trim().is_empty())
        .map(|m| {
            let mut m = m.clone();
            m.tool_calls.clear();
            m.tool_call_id = None;
            m
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use crate::working_memory::TraceKind;
    use miniluma_core::error::ProviderError;

    fn registry_in(dir: &std::path::Path) -> Arc<ToolRegistry> {
        let config = miniluma_config::ToolsConfig {
            workspace_dir: dir.display().to_string(),
            ..Default::default()
        };
        Arc::new(miniluma_tools::registry_from_config(&config))
    }

    #[tokio::test]
    async fn direct_final_response() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response(&final_json("Hello!", "greeting"))]));
        let reactor = Reactor::new(provider.clone(), "mock-model", registry_in(dir.path()));

        let outcome = reactor.process("Hi", &[]).await.unwrap();
        assert_eq!(outcome.response, "Hello!");
        assert_eq!(outcome.iterations, 1);
        assert!(outcome.completed);
        assert!(outcome.history.is_empty());
        assert_eq!(outcome.trace[0].kind, TraceKind::Thought);
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn plain_text_is_the_answer() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SequentialMockProvider::single_text("No JSON here."));
        let reactor = Reactor::new(provider, "mock-model", registry_in(dir.path()));
        let outcome = reactor.process("Hi", &[]).await.unwrap();
        assert_eq!(outcome.response, "No JSON here.");
    }

    #[tokio::test]
    async fn tool_use_then_answer() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "buy milk").unwrap();

        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response(&tool_json("read_file", json!({"path": "notes.txt"}), "check the notes")),
            make_text_response(&final_json("Your note says: buy milk", "read it")),
        ]));
        let bus = Arc::new(EventBus::default());
        let mut events = bus.subscribe();
        let reactor = Reactor::new(provider.clone(), "mock-model", registry_in(dir.path()))
            .with_event_bus(bus.clone())
            .with_conversation_id("conv-1");

        let outcome = reactor.process("What does my note say?", &[]).await.unwrap();
        assert_eq!(outcome.response, "Your note says: buy milk");
        assert_eq!(outcome.iterations, 2);
        assert_eq!(outcome.history.len(), 1);
        assert_eq!(outcome.history[0].iteration, 1);
        assert_eq!(outcome.history[0].observation, json!({"result": "buy milk", "success": true}));
        assert_eq!(outcome.tool_invocations.len(), 1);
        assert!(outcome.tool_invocations[0].success);

        let kinds: Vec<TraceKind> = outcome.trace.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![TraceKind::Thought, TraceKind::Action, TraceKind::Observation, TraceKind::Thought]
        );

        // The second pass sees the first observation.
        let second = provider.request(1);
        let prompt = second.messages.last().unwrap();
        assert!(prompt.content.contains("Action: Use tool 'read_file' with parameters path=notes.txt"));
        assert!(prompt.content.contains("Result: buy milk"));
        assert!(prompt.content.contains("Current iteration: 2"));
        assert!(!second.tools.is_empty());

        match events.try_recv().unwrap().as_ref() {
            DomainEvent::ToolExecuted { tool_name, success, .. } => {
                assert_eq!(tool_name, "read_file");
                assert!(success);
            }
            other => panic!("unexpected {other:?}"),
        }
        match events.try_recv().unwrap().as_ref() {
            DomainEvent::ResponseGenerated {
                conversation_id,
                iterations,
                tokens_used,
                ..
            } => {
                assert_eq!(conversation_id, "conv-1");
                assert_eq!(*iterations, 2);
                assert_eq!(*tokens_used, 30);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn native_tool_calls_are_used() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SequentialMockProvider::tool_then_answer(
            vec![make_tool_call("json_parser", json!({"json_string": "{\"a\": 1}", "path": "a"}))],
            "parse it",
            &final_json("a is 1", ""),
        ));
        let reactor = Reactor::new(provider, "mock-model", registry_in(dir.path()));
        let outcome = reactor.process("parse", &[]).await.unwrap();
        assert_eq!(outcome.tool_invocations[0].name, "json_parser");
        assert_eq!(outcome.tool_invocations[0].result, "1");
        assert_eq!(outcome.response, "a is 1");
    }

    #[tokio::test]
    async fn unknown_tool_observation_lists_tools() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response(&tool_json("teleport", json!({}), "")),
            make_text_response(&final_json("cannot", "")),
        ]));
        let reactor = Reactor::new(provider, "mock-model", registry_in(dir.path()));
        let outcome = reactor.process("go", &[]).await.unwrap();

        let observation = &outcome.history[0].observation;
        assert_eq!(observation["error"], "Tool 'teleport' not found");
        let tools: Vec<&str> = observation["available_tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        let mut sorted = tools.clone();
        sorted.sort_unstable();
        assert_eq!(tools, sorted);
        assert!(tools.contains(&"web_search"));
        assert!(!outcome.tool_invocations[0].success);
    }

    #[tokio::test]
    async fn tool_errors_become_observations() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response(&tool_json("json_parser", json!({"json_string": "{oops"}), "")),
            make_text_response(&final_json("bad json", "")),
        ]));
        let reactor = Reactor::new(provider, "mock-model", registry_in(dir.path()));
        let outcome = reactor.process("parse", &[]).await.unwrap();

        let observation = &outcome.history[0].observation;
        assert_eq!(observation["success"], false);
        assert!(
            observation["error"]
                .as_str()
                .unwrap()
                .starts_with("Error executing tool json_parser: ")
        );
    }

    #[tokio::test]
    async fn max_iterations_triggers_timeout_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let looping = tool_json("get_current_datetime", json!({}), "again");
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response(&looping),
            make_text_response(&looping),
            make_text_response("Here is what I found."),
        ]));
        let reactor = Reactor::new(provider.clone(), "mock-model", registry_in(dir.path())).with_max_iterations(2);

        let outcome = reactor.process("loop forever", &[]).await.unwrap();
        assert_eq!(outcome.iterations, 2);
        assert!(!outcome.completed);
        assert_eq!(outcome.response, "Here is what I found.");
        assert_eq!(outcome.history.len(), 2);

        let timeout = provider.request(2);
        assert!(timeout.tools.is_empty());
        assert!(timeout.messages[1].content.contains("Original user input: loop forever"));
    }

    #[tokio::test]
    async fn timeout_failure_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SequentialMockProvider::with_results(vec![
            Ok(make_text_response(&tool_json("get_current_datetime", json!({}), ""))),
            Err(ProviderError::Timeout("30s".into())),
        ]));
        let reactor = Reactor::new(provider, "mock-model", registry_in(dir.path())).with_max_iterations(1);
        let outcome = reactor.process("x", &[]).await.unwrap();
        assert_eq!(outcome.response, prompt::FALLBACK_RESPONSE);
    }

    #[tokio::test]
    async fn reasoning_failure_propagates() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SequentialMockProvider::with_results(vec![Err(
            ProviderError::AuthenticationFailed("bad key".into()),
        )]));
        let reactor = Reactor::new(provider, "mock-model", registry_in(dir.path()));
        let err = reactor.process("x", &[]).await.unwrap_err();
        assert!(err.to_string().contains("bad key"));
    }

    #[tokio::test]
    async fn context_and_memories_reach_the_provider() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SequentialMockProvider::single_text(&final_json("ok", "")));
        let reactor = Reactor::new(provider.clone(), "mock-model", registry_in(dir.path()))
            .with_system_prompt("Be brief.")
            .with_recalled_memories(&[MemoryEntry::new("User likes Rust")]);

        let mut tool_msg = Message::tool_result("call_1", "output");
        tool_msg.name = Some("read_file".into());
        let history = vec![Message::user("earlier question"), Message::assistant("earlier answer"), tool_msg];
        reactor.process("now", &history).await.unwrap();

        let request = provider.request(0);
        let system = &request.messages[0];
        assert_eq!(system.role, Role::System);
        assert!(system.content.starts_with("You are an intelligent assistant"));
        assert!(system.content.contains("Be brief.\n\n## Recalled Memories\n- User likes Rust"));
        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.messages[1].content, "earlier question");
        assert_eq!(request.messages[2].content, "earlier answer");
        assert_eq!(request.max_tokens, Some(1024));
    }

    #[tokio::test]
    async fn stream_reports_each_step() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response(&tool_json("get_current_datetime", json!({"format": "%Y"}), "need the year")),
            make_text_response(&final_json("It is this year.", "answer")),
        ]));
        let reactor = Reactor::new(provider, "mock-model", registry_in(dir.path()));

        let mut rx = reactor.process_stream("What year is it?", vec![]);
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        let types: Vec<&str> = events.iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            vec!["thought", "tool_call", "tool_result", "thought", "response", "done"]
        );
        assert_eq!(events[4], ReactorEvent::Response { content: "It is this year.".into() });
        assert_eq!(events[5], ReactorEvent::Done { iterations: 2 });
    }

    #[tokio::test]
    async fn stream_reports_errors() {
        let dir = tempfile::tempdir().unwrap();
        let provider = Arc::new(SequentialMockProvider::with_results(vec![Err(ProviderError::Network(
            "down".into(),
        ))]));
        let reactor = Reactor::new(provider, "mock-model", registry_in(dir.path()));
        let mut rx = reactor.process_stream("x", vec![]);
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, ReactorEvent::Error { ref message } if message.contains("down")));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn works_with_the_mock_provider() {
        let dir = tempfile::tempdir().unwrap();
        let reactor = Reactor::new(
            Arc::new(miniluma_providers::MockProvider::new()),
            "mock-model",
            registry_in(dir.path()),
        );
        let outcome = reactor.process("please help me", &[]).await.unwrap();
        assert!(outcome.completed);
        assert!(outcome.response.contains("You said: 'please help me'"));
        assert!(outcome.response.contains("## Features"));
    }
}
