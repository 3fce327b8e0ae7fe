//! `json_parser`: parse a JSON string and optionally pick a value out of it.

use crate::required_str;
use async_trait::async_trait;
use miniluma_core::error::ToolError;
use miniluma_core::tool::{Tool, ToolResult};
use serde_json::Value;

pub struct JsonParserTool;

/// Walk a dotted path such as `items.0.name`. Numeric segments index arrays.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .filter(|segment| !segment.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

#[async_trait]
impl Tool for JsonParserTool {
    fn name(&self) -> &str {
        "json_parser"
    }

    fn description(&self) -> &str {
        "Parse a JSON string. Returns it pretty-printed, or the value at a dotted path like 'data.items.0.name'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "json_string": {
                    "type": "string",
                    "description": "The JSON text to parse"
                },
                "path": {
                    "type": "string",
                    "description": "Optional dotted path into the document"
                }
            },
            "required": ["json_string"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let text = required_str(&arguments, "json_string")?;
        let parsed: Value = serde_json::from_str(text)
            .map_err(|e| ToolError::InvalidArguments(format!("Invalid JSON: {e}")))?;

        let (selected, path) = match arguments["path"].as_str().filter(|p| !p.is_empty()) {
            Some(path) => match lookup(&parsed, path) {
                Some(v) => (v.clone(), Some(path)),
                None => return Ok(ToolResult::failed(format!("Path '{path}' not found"))),
            },
            None => (parsed, None),
        };

        let output = match &selected {
            Value::String(s) if path.is_some() => s.clone(),
            other => serde_json::to_string_pretty(other)
                .map_err(|e| ToolError::InvalidArguments(e.to_string()))?,
        };
        Ok(ToolResult::ok(output).with_data(selected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const DOC: &str = r#"{"user": {"name": "Ada", "langs": ["rust", "python"]}, "count": 2}"#;

    #[tokio::test]
    async fn pretty_prints_whole_document() {
        let result = JsonParserTool
            .execute(json!({ "json_string": DOC }))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.output.contains("\n  \"count\": 2"));
        assert_eq!(result.data.unwrap()["user"]["name"], "Ada");
    }

    #[tokio::test]
    async fn dotted_path_with_index() {
        let result = JsonParserTool
            .execute(json!({ "json_string": DOC, "path": "user.langs.1" }))
            .await
            .unwrap();
        assert_eq!(result.output, "python");

        let result = JsonParserTool
            .execute(json!({ "json_string": DOC, "path": "count" }))
            .await
            .unwrap();
        assert_eq!(result.output, "2");
    }

    #[tokio::test]
    async fn missing_path_fails_softly() {
        let result = JsonParserTool
            .execute(json!({ "json_string": DOC, "path": "user.email" }))
            .await
            .unwrap();
        assert!(!result.success);
        assert_eq!(result.output, "Path 'user.email' not found");
    }

    #[tokio::test]
    async fn invalid_json_is_an_argument_error() {
        let err = JsonParserTool
            .execute(json!({ "json_string": "{not json" }))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
