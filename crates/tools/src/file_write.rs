//! `write_file`: create, overwrite or append to a file in the workspace.

use crate::path::PathPolicy;
use crate::required_str;
use async_trait::async_trait;
use miniluma_core::error::ToolError;
use miniluma_core::tool::{Tool, ToolResult};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

pub struct WriteFileTool {
    policy: Arc<PathPolicy>,
}

impl WriteFileTool {
    pub fn new(policy: Arc<PathPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, creating parent directories as needed. Set append=true to add to the end instead of overwriting."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to write to"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                },
                "append": {
                    "type": "boolean",
                    "description": "Append instead of overwriting (default false)"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = required_str(&arguments, "path")?;
        let content = required_str(&arguments, "content")?;
        let append = arguments["append"].as_bool().unwrap_or(false);

        let resolved = self.policy.resolve(self.name(), path)?;

        if let Some(parent) = resolved.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return Ok(ToolResult::failed(format!("Failed to create directories: {e}")));
            }
        }

        let written = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .append(append)
                .truncate(!append)
                .open(&resolved)
                .await?;
            file.write_all(content.as_bytes()).await?;
            file.flush().await
        }
        .await;

        let shown = resolved.display().to_string();
        match written {
            Ok(()) => {
                let verb = if append { "appended" } else { "wrote" };
                Ok(ToolResult::ok(format!(
                    "Successfully {verb} {} bytes to {shown}",
                    content.len()
                ))
                .with_data(serde_json::json!({ "path": shown })))
            }
            Err(e) => Ok(ToolResult::failed(format!("Failed to write file: {e}"))),
        }
    }
}
