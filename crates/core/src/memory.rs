//! Memory trait: persistent conversational memory.
//!
//! Every completed turn can be stored as a memory entry carrying the
//! exchange itself plus metadata (including a serialized conversation
//! history, which is what session restore reads back).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::MemoryError;

/// A single memory entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique ID for this memory
    pub id: String,

    /// The content of the memory
    pub content: String,

    /// Tags for categorization
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Source of the memory (conversation ID, tool output, etc.)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Free-form metadata
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// When this memory was created
    pub created_at: DateTime<Utc>,

    /// When this memory was last accessed
    pub last_accessed: DateTime<Utc>,

    /// Relevance score (set by search operations)
    #[serde(default)]
    pub score: f32,
}

impl MemoryEntry {
    /// A fresh entry with an empty ID; the backend assigns one on store.
    pub fn new(content: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: String::new(),
            content: content.into(),
            tags: Vec::new(),
            source: None,
            metadata: serde_json::Map::new(),
            created_at: now,
            last_accessed: now,
            score: 0.0,
        }
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Map<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A query for searching memories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryQuery {
    /// The search text
    pub text: String,

    /// Maximum number of results
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Minimum relevance score threshold
    #[serde(default)]
    pub min_score: f32,

    /// Filter by tags
    #[serde(default)]
    pub tags: Vec<String>,
}

fn default_limit() -> usize {
    5
}

impl MemoryQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: default_limit(),
            min_score: 0.0,
            tags: Vec::new(),
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// The core MemoryBackend trait.
///
/// Implementations: SQLite (FTS5) and in-memory.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Store a memory entry, returning its ID. An empty ID is generated.
    async fn store(&self, entry: MemoryEntry) -> std::result::Result<String, MemoryError>;

    /// Get a memory by ID.
    async fn get(&self, id: &str) -> std::result::Result<Option<MemoryEntry>, MemoryError>;

    /// Search memories by query, best match first.
    async fn search(&self, query: MemoryQuery) -> std::result::Result<Vec<MemoryEntry>, MemoryError>;

    /// Update content and/or metadata. Returns false if the ID is unknown.
    async fn update(
        &self,
        id: &str,
        content: Option<String>,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> std::result::Result<bool, MemoryError>;

    /// Delete a memory by ID.
    async fn delete(&self, id: &str) -> std::result::Result<bool, MemoryError>;

    /// The most recently created memories, newest first.
    async fn recent(&self, limit: usize) -> std::result::Result<Vec<MemoryEntry>, MemoryError>;

    /// Get total memory count.
    async fn count(&self) -> std::result::Result<usize, MemoryError>;

    /// Clear all memories.
    async fn clear(&self) -> std::result::Result<(), MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_query_defaults() {
        let query = MemoryQuery::new("rust programming");
        assert_eq!(query.limit, 5);
        assert!(query.tags.is_empty());
        assert_eq!(query.with_limit(2).limit, 2);
    }

    #[test]
    fn memory_entry_serialization() {
        let mut metadata = serde_json::Map::new();
        metadata.insert("type".into(), serde_json::json!("ai_dialog"));
        let entry = MemoryEntry::new("The user prefers Rust over C++")
            .with_tags(&["preference"])
            .with_source("conversation_123")
            .with_metadata(metadata);
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("Rust over C++"));
        assert!(json.contains("preference"));
        assert!(json.contains("ai_dialog"));
    }
}
