//! What the model decided to do on one pass, and what came of it.

use miniluma_core::message::Message;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The parsed decision of one reasoning pass.
///
/// Serializes to the same JSON shape the model is asked to produce.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action_type", rename_all = "snake_case")]
pub enum ReactorAction {
    ToolUse {
        tool_name: String,
        tool_params: Value,
        #[serde(default)]
        reasoning: String,
    },
    FinalResponse {
        response: String,
        #[serde(default)]
        reasoning: String,
    },
}

impl ReactorAction {
    pub fn reasoning(&self) -> &str {
        match self {
            Self::ToolUse { reasoning, .. } | Self::FinalResponse { reasoning, .. } => reasoning,
        }
    }

    /// Decide from a provider reply. Native tool calls win over text.
    pub fn from_message(message: &Message) -> Self {
        match message.tool_calls.first() {
            Some(call) => Self::ToolUse {
                tool_name: call.name.clone(),
                tool_params: params_object(serde_json::from_str(&call.arguments).unwrap_or(Value::Null)),
                reasoning: message.content.trim().to_string(),
            },
            None => Self::parse(&message.content),
        }
    }

    /// Parse the JSON action format out of free text.
    ///
    /// Anything that is not a recognizable action becomes a final
    /// response carrying the raw text.
    pub fn parse(content: &str) -> Self {
        let raw = || Self::FinalResponse {
            response: content.trim().to_string(),
            reasoning: String::new(),
        };

        let Some(object) = first_json_object(content) else {
            return raw();
        };
        let text = |key: &str| object.get(key).and_then(Value::as_str).unwrap_or_default().to_string();

        match object.get("action_type").and_then(Value::as_str) {
            Some("tool_use") => {
                let Some(tool_name) = ["tool_name", "tool"]
                    .iter()
                    .find_map(|k| object.get(*k).and_then(Value::as_str))
                else {
                    return raw();
                };
                let params = object
                    .get("tool_params")
                    .or_else(|| object.get("parameters"))
                    .cloned()
                    .unwrap_or(Value::Null);
                Self::ToolUse {
                    tool_name: tool_name.to_string(),
                    tool_params: params_object(params),
                    reasoning: text("reasoning"),
                }
            }
            Some("final_response") => {
                let response = match object.get("response") {
                    Some(Value::String(s)) => s.clone(),
                    Some(Value::Null) | None => String::new(),
                    Some(other) => other.to_string(),
                };
                Self::FinalResponse {
                    response,
                    reasoning: text("reasoning"),
                }
            }
            _ => raw(),
        }
    }
}

/// Tools take an object; `null` means no arguments.
fn params_object(params: Value) -> Value {
    match params {
        Value::Null => Value::Object(Map::new()),
        other => other,
    }
}

/// The first complete `{...}` value in `content`, ignoring code fences
/// and any prose around it.
fn first_json_object(content: &str) -> Option<Map<String, Value>> {
    let mut search = content;
    while let Some(start) = search.find('{') {
        let candidate = &search[start..];
        let mut stream = serde_json::Deserializer::from_str(candidate).into_iter::<Value>();
        if let Some(Ok(Value::Object(map))) = stream.next() {
            return Some(map);
        }
        search = &candidate[1..];
    }
    None
}

/// One completed tool-use pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based pass number.
    pub iteration: usize,
    pub thought: ReactorAction,
    pub observation: Value,
}

/// A tool the Reactor ran during a turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: Value,
    pub result: String,
    pub success: bool,
}
