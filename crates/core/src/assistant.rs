//! Assistant-facing records shared by the session layer and the HTTP API.

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// How an assistant was requested to run.
///
/// Every mode is currently served by the same Reactor-backed assistant;
/// the mode is recorded so clients can see what they asked for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantMode {
    Simple,
    MultiAgent,
    Custom,
    #[default]
    Mcp,
}

impl AssistantMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssistantMode::Simple => "simple",
            AssistantMode::MultiAgent => "multi_agent",
            AssistantMode::Custom => "custom",
            AssistantMode::Mcp => "mcp",
        }
    }

    /// Parse a mode name; unknown names fall back to the default mode.
    pub fn parse_lossy(s: &str) -> Self {
        match s {
            "simple" => AssistantMode::Simple,
            "multi_agent" => AssistantMode::MultiAgent,
            "custom" => AssistantMode::Custom,
            _ => AssistantMode::Mcp,
        }
    }
}

/// Coarse activity state of an assistant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusKind {
    #[default]
    Idle,
    Thinking,
    Processing,
    Error,
}

/// Live status of an assistant, polled by the chat UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantStatus {
    pub assistant_id: String,

    #[serde(default)]
    pub current_operation: Option<String>,

    #[serde(default)]
    pub operation_details: Option<String>,

    /// Progress in percent (0-100)
    #[serde(default)]
    pub progress: Option<f32>,

    #[serde(default)]
    pub status: StatusKind,

    /// RFC 3339 timestamp of the last update
    #[serde(default = "now_rfc3339")]
    pub timestamp: String,
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

impl AssistantStatus {
    pub fn idle(assistant_id: impl Into<String>) -> Self {
        Self {
            assistant_id: assistant_id.into(),
            current_operation: None,
            operation_details: None,
            progress: None,
            status: StatusKind::Idle,
            timestamp: now_rfc3339(),
        }
    }

    pub fn thinking(assistant_id: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            current_operation: Some(operation.into()),
            progress: Some(10.0),
            status: StatusKind::Thinking,
            ..Self::idle(assistant_id)
        }
    }

    pub fn error(assistant_id: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            current_operation: Some("Error while processing the request".into()),
            operation_details: Some(details.into()),
            status: StatusKind::Error,
            ..Self::idle(assistant_id)
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.operation_details = Some(details.into());
        self
    }

    /// Set the timestamp to now.
    pub fn touch(&mut self) {
        self.timestamp = now_rfc3339();
    }
}

/// Public description of a live assistant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantInfo {
    pub assistant_id: String,
    pub name: String,
    pub conversation_id: String,
    pub provider: String,
    pub model: String,
}
