//! Post-processing of model replies: saving code blocks, splitting off the
//! reasoning, and spotting replies that stopped early.

use crate::files::{FileManager, extract_code_blocks};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::warn;

const RESPONSE_MARKERS: &[&str] = &[
    "最终回答：",
    "最终回答:",
    "Final answer:",
    "回答：",
    "回答:",
    "Answer:",
    "总结：",
    "总结:",
    "Summary:",
];

const THOUGHT_MARKERS: &[&str] = &[
    "思考过程：",
    "思考过程:",
    "Thinking:",
    "Thinking process:",
    "思路分析：",
    "思路分析:",
    "Analysis:",
    "让我思考一下",
    "Let me think",
];

const INSTRUCTION_MARKERS: &[&str] = &["接下来", "next", "继续", "continue", "然后", "then"];

pub const SEE_ANALYSIS: &str = "See the analysis above.";

/// Saves the code blocks of a reply and notes them at the end of it.
#[derive(Debug, Clone)]
pub struct ResponseProcessor {
    files: FileManager,
}

impl ResponseProcessor {
    pub fn new(files: FileManager) -> Self {
        Self { files }
    }

    pub fn files(&self) -> &FileManager {
        &self.files
    }

    /// Returns the reply with a `Saved files` footer, and the saved paths.
    /// Blocks that cannot be written are left out of both.
    pub async fn process_response(&self, response: &str, subdir: Option<&str>) -> (String, Vec<PathBuf>) {
        let mut out = response.to_string();
        let mut saved = Vec::new();

        for (filename, code) in extract_code_blocks(response) {
            let path = match self.files.save_file(&code, &filename, subdir).await {
                Ok(path) => path,
                Err(e) => {
                    warn!(filename = %filename, error = %e, "Code block not saved");
                    continue;
                }
            };
            if saved.is_empty() {
                out.push_str("\n\n---\n\n**Saved files:**\n");
            }
            let rel = path.strip_prefix(self.files.session_dir()).unwrap_or(&path);
            out.push_str(&format!("- `{}` ({} bytes)\n", rel.display(), code.len()));
            saved.push(path);
        }
        (out, saved)
    }
}

/// Split a reply into `(thought, answer)`.
///
/// The first answer marker found splits the text. Without one, a reply
/// that reads as pure analysis is all thought.
pub fn extract_thought_process(response: &str) -> (String, String) {
    for marker in RESPONSE_MARKERS {
        if let Some((thought, answer)) = response.split_once(marker) {
            return (thought.trim().to_string(), answer.trim().to_string());
        }
    }

    if THOUGHT_MARKERS.iter().any(|m| response.contains(m)) {
        return (response.to_string(), SEE_ANALYSIS.to_string());
    }

    (String::new(), response.to_string())
}

pub fn format_for_display(response: &str, include_thought: bool) -> String {
    let (thought, answer) = extract_thought_process(response);
    if include_thought && !thought.is_empty() {
        format!("**Thought process:**\n\n{thought}\n\n---\n\n**Answer:**\n\n{answer}")
    } else {
        answer
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteKind {
    CodeBlock,
    Ellipsis,
    Instruction,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incomplete {
    pub kind: IncompleteKind,
    pub details: String,
}

/// Signs that a reply was cut off or promises more.
pub fn detect_completions(response: &str) -> Vec<Incomplete> {
    let mut found = Vec::new();

    // Fence lines alternate open/close.
    let fences = response.lines().filter(|l| l.trim_start().starts_with("```")).count();
    let opened = fences.div_ceil(2);
    let closed = fences / 2;
    if opened > closed {
        found.push(Incomplete {
            kind: IncompleteKind::CodeBlock,
            details: format!("{} unclosed code block(s)", opened - closed),
        });
    }

    let trimmed = response.trim_end();
    if trimmed.ends_with("...") || trimmed.ends_with('…') {
        found.push(Incomplete {
            kind: IncompleteKind::Ellipsis,
            details: "Response ends with an ellipsis and may be unfinished".into(),
        });
    }

    let lines: Vec<&str> = response.split('\n').collect();
    for line in &lines[lines.len().saturating_sub(3)..] {
        let lower = line.to_lowercase();
        if INSTRUCTION_MARKERS.iter().any(|m| lower.contains(m)) {
            found.push(Incomplete {
                kind: IncompleteKind::Instruction,
                details: format!("Possible unfinished instruction: '{}'", line.trim()),
            });
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_at_answer_marker() {
        let (thought, answer) = extract_thought_process("I weighed options.\nFinal answer: use tokio");
        assert_eq!(thought, "I weighed options.");
        assert_eq!(answer, "use tokio");

        let (thought, answer) = extract_thought_process("分析一下\n回答：好的");
        assert_eq!(thought, "分析一下");
        assert_eq!(answer, "好的");
    }

    #[test]
    fn thought_only() {
        let (thought, answer) = extract_thought_process("Let me think about lifetimes here.");
        assert_eq!(thought, "Let me think about lifetimes here.");
        assert_eq!(answer, SEE_ANALYSIS);
    }

    #[test]
    fn plain_reply_is_all_answer() {
        assert_eq!(extract_thought_process("Hello"), (String::new(), "Hello".into()));
        assert_eq!(format_for_display("Hello", true), "Hello");
    }

    #[test]
    fn display_with_thought() {
        let text = format_for_display("Thinking: hmm\nAnswer: 42", true);
        assert!(text.starts_with("**Thought process:**\n\nThinking: hmm"));
        assert!(text.ends_with("**Answer:**\n\n42"));
        assert_eq!(format_for_display("Thinking: hmm\nAnswer: 42", false), "42");
    }

    #[test]
    fn detects_unclosed_fence() {
        let found = detect_completions("Here:\n```python\nprint(1)\n");
        assert_eq!(found[0].kind, IncompleteKind::CodeBlock);
        assert!(detect_completions("```py\nx\n```\nDone.").is_empty());
    }

    #[test]
    fn detects_ellipsis_and_instructions() {
        let kinds: Vec<IncompleteKind> = detect_completions("Step one done.\nNext I will write tests…")
            .into_iter()
            .map(|i| i.kind)
            .collect();
        assert_eq!(kinds, vec![IncompleteKind::Ellipsis, IncompleteKind::Instruction]);
    }

    #[tokio::test]
    async fn appends_saved_files() {
        let dir = tempfile::tempdir().unwrap();
        let processor = ResponseProcessor::new(FileManager::new(dir.path()));

        let (text, saved) = processor
            .process_response("Code:\n```python\nprint(1)\n```", Some("task"))
            .await;
        assert_eq!(saved.len(), 1);
        assert!(text.contains("\n\n---\n\n**Saved files:**\n"));
        assert!(text.contains("task/script_1.py` (8 bytes)"));

        let (text, saved) = processor.process_response("No code", None).await;
        assert_eq!(text, "No code");
        assert!(saved.is_empty());
    }
}
