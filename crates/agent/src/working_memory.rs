//! Working memory: the Reactor's scratchpad for a single turn.
//!
//! Holds the Thought/Action/Observation trace and the tool results of the
//! current turn, plus the iteration counter that bounds the loop. It is
//! serializable so the trace can be shipped to clients alongside a reply.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkingMemory {
    /// Reasoning trace, in order.
    pub trace: Vec<TraceEntry>,

    pub tool_results: Vec<ToolResultEntry>,

    /// Passes started so far.
    pub iterations: usize,

    pub max_iterations: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub kind: TraceKind,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TraceKind {
    Thought,
    Action,
    Observation,
    Reflection,
}

impl TraceKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Thought => "Thought",
            Self::Action => "Action",
            Self::Observation => "Observation",
            Self::Reflection => "Reflection",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResultEntry {
    pub tool_name: String,
    pub input_summary: String,
    pub output_summary: String,
    pub success: bool,
    pub timestamp: DateTime<Utc>,
}

impl WorkingMemory {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            trace: Vec::new(),
            tool_results: Vec::new(),
            iterations: 0,
            max_iterations,
        }
    }

    pub fn add_thought(&mut self, thought: &str) {
        self.push_trace(TraceKind::Thought, thought);
    }

    pub fn add_action(&mut self, action: &str) {
        self.push_trace(TraceKind::Action, action);
    }

    pub fn add_observation(&mut self, observation: &str) {
        self.push_trace(TraceKind::Observation, observation);
    }

    pub fn add_reflection(&mut self, reflection: &str) {
        self.push_trace(TraceKind::Reflection, reflection);
    }

    fn push_trace(&mut self, kind: TraceKind, content: &str) {
        self.trace.push(TraceEntry {
            kind,
            content: content.to_string(),
            timestamp: Utc::now(),
        });
    }

    pub fn add_tool_result(&mut self, tool_name: &str, input: &str, output: &str, success: bool) {
        self.tool_results.push(ToolResultEntry {
            tool_name: tool_name.to_string(),
            input_summary: input.to_string(),
            output_summary: output.to_string(),
            success,
            timestamp: Utc::now(),
        });
    }

    /// Start another pass. Returns `false` once the budget is overrun.
    pub fn tick(&mut self) -> bool {
        self.iterations += 1;
        self.iterations <= self.max_iterations
    }

    /// No passes left.
    pub fn is_exhausted(&self) -> bool {
        self.iterations >= self.max_iterations
    }

    /// Human-readable trace, one `[Kind] content` line per entry.
    pub fn render(&self) -> String {
        let mut out = String::new();

        if !self.trace.is_empty() {
            out.push_str("## Reasoning Trace\n");
            for entry in &self.trace {
                out.push_str(&format!("[{}] {}\n", entry.kind.label(), entry.content));
            }
            out.push('\n');
        }

        if !self.tool_results.is_empty() {
            out.push_str("## Tool Results\n");
            for tr in &self.tool_results {
                let status = if tr.success { "ok" } else { "failed" };
                out.push_str(&format!("- {} ({status}): {}\n", tr.tool_name, tr.output_summary));
            }
            out.push('\n');
        }

        out.push_str(&format!("Iterations: {}/{}\n", self.iterations, self.max_iterations));
        out
    }

    pub fn summarize(&self) -> String {
        let mut parts = Vec::new();
        if !self.tool_results.is_empty() {
            let success = self.tool_results.iter().filter(|t| t.success).count();
            parts.push(format!(
                "{} tool calls ({} successful)",
                self.tool_results.len(),
                success
            ));
        }
        parts.push(format!("{} iterations used", self.iterations));
        parts.join(". ")
    }

    pub fn clear(&mut self) {
        self.trace.clear();
        self.tool_results.clear();
        self.iterations = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.trace.is_empty() && self.tool_results.is_empty()
    }
}

impl Default for WorkingMemory {
    fn default() -> Self {
        Self::new(10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_recording() {
        let mut wm = WorkingMemory::default();
        wm.add_thought("I should search for the docs");
        wm.add_action("web_search({\"query\":\"tokio\"})");
        wm.add_observation("1. Tokio - https://tokio.rs");

        assert_eq!(wm.trace.len(), 3);
        assert_eq!(wm.trace[0].kind, TraceKind::Thought);
        assert_eq!(wm.trace[1].kind, TraceKind::Action);
        assert_eq!(wm.trace[2].kind, TraceKind::Observation);
    }

    #[test]
    fn iteration_budget() {
        let mut wm = WorkingMemory::new(2);
        assert!(!wm.is_exhausted());
        assert!(wm.tick());
        assert!(!wm.is_exhausted());
        assert!(wm.tick());
        assert!(wm.is_exhausted());
        assert!(!wm.tick());
    }

    #[test]
    fn render_and_summarize() {
        let mut wm = WorkingMemory::default();
        wm.tick();
        wm.add_thought("Need the time");
        wm.add_action("get_current_datetime({})");
        wm.add_tool_result("get_current_datetime", "{}", "2026-01-01T00:00:00Z", true);
        wm.add_tool_result("read_file", "{}", "missing", false);

        let rendered = wm.render();
        assert!(rendered.contains("[Thought] Need the time"));
        assert!(rendered.contains("- read_file (failed): missing"));
        assert!(rendered.ends_with("Iterations: 1/10\n"));
        assert_eq!(wm.summarize(), "2 tool calls (1 successful). 1 iterations used");
    }

    #[test]
    fn clear_resets_everything() {
        let mut wm = WorkingMemory::default();
        wm.add_reflection("done");
        wm.add_tool_result("t", "i", "o", true);
        wm.tick();
        wm.clear();
        assert!(wm.is_empty());
        assert_eq!(wm.iterations, 0);
    }

    #[test]
    fn trace_kind_serializes_snake_case() {
        let json = serde_json::to_string(&TraceKind::Observation).unwrap();
        assert_eq!(json, "\"observation\"");
    }
}
