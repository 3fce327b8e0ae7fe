//! Bounded working log of what an assistant did and what came back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// One thought/result pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogItem {
    pub timestamp: DateTime<Utc>,
    pub thought: Value,
    pub result: Value,
}

/// Thought/result history capped at `max_items`, plus a short-term scratch map.
#[derive(Debug, Clone)]
pub struct MemoryLog {
    items: Vec<LogItem>,
    max_items: usize,
    short_term: HashMap<String, Value>,
}

impl Default for MemoryLog {
    fn default() -> Self {
        Self::new(100)
    }
}

impl MemoryLog {
    pub fn new(max_items: usize) -> Self {
        Self {
            items: Vec::new(),
            max_items: max_items.max(1),
            short_term: HashMap::new(),
        }
    }

    /// Append a pair, dropping the oldest once over capacity.
    pub fn record(&mut self, thought: Value, result: Value) {
        self.items.push(LogItem {
            timestamp: Utc::now(),
            thought,
            result,
        });
        if self.items.len() > self.max_items {
            let excess = self.items.len() - self.max_items;
            self.items.drain(..excess);
        }
    }

    /// The last `n` items, oldest first.
    pub fn recent(&self, n: usize) -> &[LogItem] {
        &self.items[self.items.len().saturating_sub(n)..]
    }

    /// Case-insensitive substring search over thoughts and results,
    /// most recent first.
    pub fn search(&self, query: &str, limit: usize) -> Vec<&LogItem> {
        let query = query.to_lowercase();
        self.items
            .iter()
            .rev()
            .filter(|item| {
                item.thought.to_string().to_lowercase().contains(&query)
                    || value_text(&item.result).to_lowercase().contains(&query)
            })
            .take(limit)
            .collect()
    }

    pub fn store_short_term(&mut self, key: impl Into<String>, value: Value) {
        self.short_term.insert(key.into(), value);
    }

    pub fn get_short_term(&self, key: &str) -> Option<&Value> {
        self.short_term.get(key)
    }

    pub fn clear_short_term(&mut self) {
        self.short_term.clear();
    }

    pub fn clear_all(&mut self) {
        self.items.clear();
        self.clear_short_term();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Numbered digest of the last `n` items.
    pub fn summarize(&self, n: usize) -> String {
        let recent = self.recent(n);
        if recent.is_empty() {
            return "No memories available.".into();
        }

        let mut summary = String::from("Recent actions and observations:\n");
        for (i, item) in recent.iter().enumerate() {
            let thought = match item.thought.get("tool").and_then(Value::as_str) {
                Some(tool) => format!("Used tool: {tool}"),
                None => truncate(&value_text(&item.thought), 100),
            };
            let result = match item.result.get("error") {
                Some(err) => format!("Error: {}", value_text(err)),
                None => truncate(&value_text(&item.result), 100),
            };
            summary.push_str(&format!("{}. {thought} -> {result}\n", i + 1));
        }
        summary
    }
}

/// Strings render bare, everything else as JSON.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Cut to `max` characters, appending `...` when cut.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut cut: String = text.chars().take(max).collect();
    cut.push_str("...");
    cut
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn capacity_drops_oldest() {
        let mut log = MemoryLog::new(3);
        for i in 0..5 {
            log.record(json!(format!("step {i}")), json!(i));
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.recent(10)[0].thought, json!("step 2"));
        assert_eq!(log.recent(1)[0].result, json!(4));
    }

    #[test]
    fn search_is_case_insensitive_and_newest_first() {
        let mut log = MemoryLog::default();
        log.record(json!({"tool": "web_search"}), json!("Found Tokio docs"));
        log.record(json!("unrelated"), json!("nothing"));
        log.record(json!({"tool": "read_file"}), json!("tokio = \"1\""));

        let hits = log.search("TOKIO", 5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].thought["tool"], "read_file");
        assert_eq!(log.search("tokio", 1).len(), 1);
    }

    #[test]
    fn short_term_scratch() {
        let mut log = MemoryLog::default();
        log.store_short_term("last_file", json!("index.html"));
        assert_eq!(log.get_short_term("last_file"), Some(&json!("index.html")));
        log.record(json!("t"), json!("r"));

        log.clear_short_term();
        assert!(log.get_short_term("last_file").is_none());
        assert_eq!(log.len(), 1);

        log.store_short_term("k", json!(1));
        log.clear_all();
        assert!(log.is_empty());
        assert!(log.get_short_term("k").is_none());
    }

    #[test]
    fn summarize_formats_tools_errors_and_long_text() {
        let mut log = MemoryLog::default();
        assert_eq!(log.summarize(5), "No memories available.");

        log.record(json!({"tool": "web_search", "params": {}}), json!("3 results"));
        log.record(json!("plain thought"), json!({"error": "file missing"}));
        log.record(json!("x".repeat(150)), json!("ok"));

        let summary = log.summarize(10);
        assert!(summary.starts_with("Recent actions and observations:\n"));
        assert!(summary.contains("1. Used tool: web_search -> 3 results\n"));
        assert!(summary.contains("2. plain thought -> Error: file missing\n"));
        assert!(summary.contains(&format!("3. {}... -> ok\n", "x".repeat(100))));
    }
}
