//! `list_files`: directory listing, optionally recursive.

use crate::path::PathPolicy;
use async_trait::async_trait;
use miniluma_core::error::ToolError;
use miniluma_core::tool::{Tool, ToolResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Recursive listings stop after this many entries.
const MAX_ENTRIES: usize = 1000;

pub struct ListFilesTool {
    policy: Arc<PathPolicy>,
}

impl ListFilesTool {
    pub fn new(policy: Arc<PathPolicy>) -> Self {
        Self { policy }
    }
}

/// Entries under `root`, relative to it, directories suffixed with `/`.
async fn collect_entries(root: &Path, recursive: bool) -> std::io::Result<Vec<String>> {
    let mut entries = Vec::new();
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut reader = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = reader.next_entry().await? {
            let path = entry.path();
            let relative = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .to_string_lossy()
                .replace('\\', "/");
            if entry.file_type().await?.is_dir() {
                entries.push(format!("{relative}/"));
                if recursive {
                    pending.push(path);
                }
            } else {
                entries.push(relative);
            }
            if entries.len() >= MAX_ENTRIES {
                entries.sort();
                return Ok(entries);
            }
        }
    }

    entries.sort();
    Ok(entries)
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files in a directory. Directories end with '/'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list (default: the workspace)"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Include subdirectories (default false)"
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = arguments["path"].as_str().unwrap_or(".");
        let recursive = arguments["recursive"].as_bool().unwrap_or(false);
        let resolved = self.policy.resolve(self.name(), path)?;

        match collect_entries(&resolved, recursive).await {
            Ok(entries) if entries.is_empty() => {
                Ok(ToolResult::ok(format!("{} is empty", resolved.display()))
                    .with_data(serde_json::json!({ "entries": [] })))
            }
            Ok(entries) => Ok(ToolResult::ok(entries.join("\n"))
                .with_data(serde_json::json!({ "entries": entries }))),
            Err(e) => Ok(ToolResult::failed(format!(
                "Failed to list {}: {e}",
                resolved.display()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.py"), "a").unwrap();
        std::fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        std::fs::write(dir.path().join("src/main.rs"), "fn main() {}").unwrap();
        dir
    }

    #[tokio::test]
    async fn flat_listing_is_sorted() {
        let dir = fixture();
        let tool = ListFilesTool::new(Arc::new(PathPolicy::new(dir.path())));
        let result = tool.execute(serde_json::json!({})).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output, "a.py\nb.txt\nsrc/");
    }

    #[tokio::test]
    async fn recursive_listing() {
        let dir = fixture();
        let tool = ListFilesTool::new(Arc::new(PathPolicy::new(dir.path())));
        let result = tool
            .execute(serde_json::json!({ "recursive": true }))
            .await
            .unwrap();
        let entries: Vec<&str> = result.output.lines().collect();
        assert_eq!(
            entries,
            vec!["a.py", "b.txt", "src/", "src/main.rs", "src/nested/"]
        );
    }

    #[tokio::test]
    async fn missing_directory_fails_softly() {
        let dir = fixture();
        let tool = ListFilesTool::new(Arc::new(PathPolicy::new(dir.path())));
        let result = tool
            .execute(serde_json::json!({ "path": "nope" }))
            .await
            .unwrap();
        assert!(!result.success);
    }
}
