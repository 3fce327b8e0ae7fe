//! `read_file`: read UTF-8 text from inside the workspace.

use crate::path::PathPolicy;
use crate::required_str;
use async_trait::async_trait;
use miniluma_core::error::ToolError;
use miniluma_core::tool::{Tool, ToolResult};
use std::sync::Arc;

pub struct ReadFileTool {
    policy: Arc<PathPolicy>,
}

impl ReadFileTool {
    pub fn new(policy: Arc<PathPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a text file. Relative paths are resolved against the workspace."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "The file path to read"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let path = required_str(&arguments, "path")?;
        let resolved = self.policy.resolve(self.name(), path)?;

        match tokio::fs::read_to_string(&resolved).await {
            Ok(content) => Ok(ToolResult::ok(content)
                .with_data(serde_json::json!({ "path": resolved.display().to_string() }))),
            Err(e) => Ok(ToolResult::failed(format!("Failed to read file: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_in(dir: &std::path::Path) -> ReadFileTool {
        ReadFileTool::new(Arc::new(PathPolicy::new(dir)))
    }

    #[test]
    fn tool_definition() {
        let dir = tempfile::tempdir().unwrap();
        let tool = tool_in(dir.path());
        assert_eq!(tool.name(), "read_file");
        let schema = tool.parameters_schema();
        assert_eq!(schema["required"], serde_json::json!(["path"]));
        assert!(schema["properties"]["path"].is_object());
    }

    #[tokio::test]
    async fn read_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("test.txt"), "Hello, world!\n").unwrap();

        let result = tool_in(dir.path())
            .execute(serde_json::json!({ "path": "test.txt" }))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "Hello, world!\n");
    }

    #[tokio::test]
    async fn read_nonexistent_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = tool_in(dir.path())
            .execute(serde_json::json!({ "path": "missing.txt" }))
            .await
            .unwrap();
        assert!(!result.success);
        assert!(result.output.contains("Failed to read file"));
    }

    #[tokio::test]
    async fn missing_path_argument() {
        let dir = tempfile::tempdir().unwrap();
        let err = tool_in(dir.path()).execute(serde_json::json!({})).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn traversal_is_denied() {
        let dir = tempfile::tempdir().unwrap();
        let err = tool_in(dir.path())
            .execute(serde_json::json!({ "path": "../../etc/hostname" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }
}
