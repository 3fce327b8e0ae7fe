//! `get_current_datetime`: local time, RFC 3339 or a strftime format.

use async_trait::async_trait;
use chrono::format::{Item, StrftimeItems};
use miniluma_core::error::ToolError;
use miniluma_core::tool::{Tool, ToolResult};
use std::fmt::Write;

pub struct DateTimeTool;

#[async_trait]
impl Tool for DateTimeTool {
    fn name(&self) -> &str {
        "get_current_datetime"
    }

    fn description(&self) -> &str {
        "Get the current local date and time. Optionally pass a strftime format such as '%Y-%m-%d %H:%M'."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "format": {
                    "type": "string",
                    "description": "strftime format string (default RFC 3339)"
                }
            }
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let now = chrono::Local::now();
        let data = serde_json::json!({
            "iso": now.to_rfc3339(),
            "unix": now.timestamp(),
            "timezone": now.format("%:z").to_string(),
        });

        let Some(format) = arguments["format"].as_str().filter(|f| !f.is_empty()) else {
            return Ok(ToolResult::ok(now.to_rfc3339()).with_data(data));
        };

        let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
        if items.iter().any(|item| matches!(item, Item::Error)) {
            return Err(ToolError::InvalidArguments(format!(
                "Invalid datetime format '{format}'"
            )));
        }

        let mut rendered = String::new();
        write!(rendered, "{}", now.format_with_items(items.into_iter())).map_err(|_| {
            ToolError::InvalidArguments(format!("Cannot render datetime format '{format}'"))
        })?;
        Ok(ToolResult::ok(rendered).with_data(data))
    }
}
