//! Reactor-level streaming events.
//!
//! `ReactorEvent` is what the gateway forwards to clients over SSE while a
//! turn runs. The `type` tag doubles as the SSE event name.

use serde::{Deserialize, Serialize};

/// Events emitted by the Reactor during one turn.
///
/// - `thought`: the model's reasoning for the next step
/// - `tool_call`: a tool is about to run
/// - `tool_result`: the tool finished
/// - `response`: the final answer text
/// - `done`: the turn is over
/// - `error`: the turn failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReactorEvent {
    Thought {
        content: String,
    },

    ToolCall {
        name: String,
        arguments: serde_json::Value,
    },

    ToolResult {
        name: String,
        output: String,
        success: bool,
    },

    Response {
        content: String,
    },

    Done {
        iterations: usize,
    },

    Error {
        message: String,
    },
}

impl ReactorEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Thought { .. } => "thought",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Response { .. } => "response",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// `done` and `error` end a stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_tool_call() {
        let event = ReactorEvent::ToolCall {
            name: "web_search".into(),
            arguments: serde_json::json!({"query": "tokio"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_call""#));
        assert!(json.contains(r#""name":"web_search""#));
        assert!(json.contains(r#""query":"tokio""#));
    }

    #[test]
    fn event_serialization_done() {
        let json = serde_json::to_string(&ReactorEvent::Done { iterations: 2 }).unwrap();
        assert_eq!(json, r#"{"type":"done","iterations":2}"#);
    }

    #[test]
    fn event_type_matches_serde_tag() {
        let events = [
            ReactorEvent::Thought { content: "x".into() },
            ReactorEvent::ToolCall {
                name: "a".into(),
                arguments: serde_json::Value::Null,
            },
            ReactorEvent::ToolResult {
                name: "a".into(),
                output: "b".into(),
                success: true,
            },
            ReactorEvent::Response { content: "x".into() },
            ReactorEvent::Done { iterations: 0 },
            ReactorEvent::Error { message: "x".into() },
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.event_type());
        }
    }

    #[test]
    fn terminal_events() {
        assert!(ReactorEvent::Done { iterations: 1 }.is_terminal());
        assert!(ReactorEvent::Error { message: "x".into() }.is_terminal());
        assert!(!ReactorEvent::Response { content: "x".into() }.is_terminal());
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"response","content":"hi"}"#;
        let event: ReactorEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event, ReactorEvent::Response { content: "hi".into() });
    }
}
