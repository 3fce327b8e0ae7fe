//! # MiniLuma Core
//!
//! Domain types, traits, and error definitions for the MiniLuma agent framework.
//! This crate has no framework dependencies: it defines the domain model
//! that every other crate implements against.
//!
//! The seams are traits: [`Provider`] for language models, [`Tool`] for
//! capabilities the model can invoke, and [`MemoryBackend`] for persisted
//! conversational memory. Implementations live in their own crates.

pub mod error;
pub mod message;
pub mod provider;
pub mod tool;
pub mod memory;
pub mod assistant;
pub mod event;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use message::{Conversation, ConversationId, Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, StreamChunk, ToolDefinition, Usage};
pub use tool::{Tool, ToolCall, ToolRegistry, ToolResult};
pub use memory::{MemoryBackend, MemoryEntry, MemoryQuery};
pub use assistant::{AssistantInfo, AssistantMode, AssistantStatus, StatusKind};
pub use event::{DomainEvent, EventBus};
