//! Per-conversation transcript as JSON lines.
//!
//! Write failures are reported through `tracing` and otherwise ignored;
//! a broken transcript never fails a turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct ConversationLogger {
    path: PathBuf,
}

impl ConversationLogger {
    /// Transcript at `<dir>/conversation_<id>.jsonl`.
    pub fn new(dir: impl AsRef<Path>, conversation_id: &str) -> Self {
        Self {
            path: dir.as_ref().join(format!("conversation_{conversation_id}.jsonl")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn log(&self, role: &str, content: &str, agent: Option<&str>) {
        let record = LogRecord {
            timestamp: Utc::now(),
            role: role.to_string(),
            agent: agent.map(str::to_string),
            content: content.to_string(),
        };
        if let Err(e) = self.append(&record).await {
            warn!(path = %self.path.display(), error = %e, "Failed to write conversation log");
        }
    }

    pub async fn log_system_event(&self, title: &str, details: &str) {
        let content = if details.is_empty() {
            title.to_string()
        } else {
            format!("{title}: {details}")
        };
        self.log("system", &content, None).await;
    }

    async fn append(&self, record: &LogRecord) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await
    }

    /// Every record so far. Unparseable lines are skipped.
    pub async fn read_all(&self) -> Vec<LogRecord> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text.lines().filter_map(|l| serde_json::from_str(l).ok()).collect(),
            Err(_) => Vec::new(),
        }
    }
}
