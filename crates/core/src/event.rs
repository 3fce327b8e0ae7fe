//! Domain events broadcast by assistants and the gateway.
//!
//! Subscribers (tests, the gateway log) observe what assistants do without
//! the assistant knowing who is listening.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::assistant::StatusKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    /// The Reactor produced a final response
    ResponseGenerated {
        conversation_id: String,
        model: String,
        tokens_used: u32,
        iterations: usize,
        timestamp: DateTime<Utc>,
    },

    ToolExecuted {
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// `operation` is one of `store`, `restore` or `search`.
    MemoryAccessed {
        operation: String,
        count: usize,
        timestamp: DateTime<Utc>,
    },

    /// Generated files were copied or moved into the results folder
    FilesArchived {
        conversation_id: String,
        files: Vec<String>,
        timestamp: DateTime<Utc>,
    },

    StatusChanged {
        assistant_id: String,
        status: StatusKind,
        timestamp: DateTime<Utc>,
    },

    SessionEnded {
        conversation_id: String,
        message_count: usize,
        timestamp: DateTime<Utc>,
    },

    ErrorOccurred {
        context: String,
        error_message: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Short name used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ResponseGenerated { .. } => "response_generated",
            Self::ToolExecuted { .. } => "tool_executed",
            Self::MemoryAccessed { .. } => "memory_accessed",
            Self::FilesArchived { .. } => "files_archived",
            Self::StatusChanged { .. } => "status_changed",
            Self::SessionEnded { .. } => "session_ended",
            Self::ErrorOccurred { .. } => "error_occurred",
        }
    }
}

/// Multi-consumer pub/sub over `tokio::sync::broadcast`.
///
/// Slow subscribers lag and drop old events; publishers never block.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
