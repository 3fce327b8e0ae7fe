//! In-memory backend: ephemeral sessions and tests.

use async_trait::async_trait;
use chrono::Utc;
use miniluma_core::error::MemoryError;
use miniluma_core::memory::{MemoryBackend, MemoryEntry, MemoryQuery};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::generate_memory_id;

/// Stores memories in a Vec, oldest first.
///
/// With a `max_items` cap the oldest entries are evicted on insert.
pub struct InMemoryBackend {
    entries: Arc<RwLock<Vec<MemoryEntry>>>,
    max_items: Option<usize>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            max_items: None,
        }
    }

    pub fn with_max_items(max_items: usize) -> Self {
        Self {
            max_items: Some(max_items.max(1)),
            ..Self::new()
        }
    }

    /// Lowercased text a query is matched against.
    fn haystack(entry: &MemoryEntry) -> String {
        let mut text = entry.content.to_lowercase();
        for tag in &entry.tags {
            text.push(' ');
            text.push_str(&tag.to_lowercase());
        }
        if !entry.metadata.is_empty() {
            text.push(' ');
            text.push_str(&serde_json::Value::Object(entry.metadata.clone()).to_string().to_lowercase());
        }
        text
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MemoryBackend for InMemoryBackend {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn store(&self, mut entry: MemoryEntry) -> Result<String, MemoryError> {
        if entry.id.is_empty() {
            entry.id = generate_memory_id();
        }
        let id = entry.id.clone();

        let mut entries = self.entries.write().await;
        entries.retain(|e| e.id != id);
        entries.push(entry);
        if let Some(max) = self.max_items {
            if entries.len() > max {
                let excess = entries.len() - max;
                entries.drain(..excess);
            }
        }
        Ok(id)
    }

    async fn get(&self, id: &str) -> Result<Option<MemoryEntry>, MemoryError> {
        let mut entries = self.entries.write().await;
        Ok(entries.iter_mut().find(|e| e.id == id).map(|e| {
            e.last_accessed = Utc::now();
            e.clone()
        }))
    }

    async fn search(&self, query: MemoryQuery) -> Result<Vec<MemoryEntry>, MemoryError> {
        let terms: Vec<String> = query
            .text
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if terms.is_empty() {
            return self.recent(query.limit).await;
        }

        let entries = self.entries.read().await;
        let mut results: Vec<MemoryEntry> = entries
            .iter()
            .rev()
            .filter(|e| query.tags.is_empty() || query.tags.iter().any(|t| e.tags.contains(t)))
            .filter_map(|e| {
                let haystack = Self::haystack(e);
                let matched = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
                if matched == 0 {
                    return None;
                }
                let mut hit = e.clone();
                hit.score = matched as f32 / terms.len() as f32;
                (hit.score >= query.min_score).then_some(hit)
            })
            .collect();

        results.truncate(query.limit);
        Ok(results)
    }

    async fn update(
        &self,
        id: &str,
        content: Option<String>,
        metadata: Option<serde_json::Map<String, serde_json::Value>>,
    ) -> Result<bool, MemoryError> {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.iter_mut().find(|e| e.id == id) else {
            return Ok(false);
        };
        if let Some(content) = content {
            entry.content = content;
        }
        if let Some(metadata) = metadata {
            entry.metadata = metadata;
        }
        entry.last_accessed = Utc::now();
        Ok(true)
    }

    async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
        let mut entries = self.entries.write().await;
        let len_before = entries.len();
        entries.retain(|e| e.id != id);
        Ok(entries.len() < len_before)
    }

    async fn recent(&self, limit: usize) -> Result<Vec<MemoryEntry>, MemoryError> {
        let entries = self.entries.read().await;
        Ok(entries.iter().rev().take(limit).cloned().collect())
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.entries.read().await.len())
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        self.entries.write().await.clear();
        Ok(())
    }
}
