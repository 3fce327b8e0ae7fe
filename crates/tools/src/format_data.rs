//! `format_data`: render JSON data as pretty JSON, a table, a list or CSV.

use async_trait::async_trait;
use miniluma_core::error::ToolError;
use miniluma_core::tool::{Tool, ToolResult};
use serde_json::{Map, Value};

pub struct FormatDataTool;

fn cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The array's objects and their keys in first-seen order.
fn records(data: &Value) -> Option<(Vec<&Map<String, Value>>, Vec<String>)> {
    let rows: Vec<&Map<String, Value>> = data
        .as_array()?
        .iter()
        .map(Value::as_object)
        .collect::<Option<_>>()?;
    if rows.is_empty() {
        return None;
    }
    let mut columns: Vec<String> = Vec::new();
    for row in &rows {
        for key in row.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    Some((rows, columns))
}

fn to_table(data: &Value) -> Result<String, ToolError> {
    let (rows, columns) = records(data).ok_or_else(|| {
        ToolError::InvalidArguments("Table format requires a non-empty array of objects".into())
    })?;

    let grid: Vec<Vec<String>> = rows
        .iter()
        .map(|row| columns.iter().map(|c| row.get(c).map(cell).unwrap_or_default()).collect())
        .collect();
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            grid.iter()
                .map(|r| r[i].chars().count())
                .chain(std::iter::once(c.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |cells: &[String]| {
        let padded: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(text, w)| format!("{text:<w$}"))
            .collect();
        format!("| {} |", padded.join(" | "))
    };

    let mut out = vec![line(&columns)];
    out.push(format!(
        "|{}|",
        widths.iter().map(|w| "-".repeat(w + 2)).collect::<Vec<_>>().join("|")
    ));
    out.extend(grid.iter().map(|r| line(r)));
    Ok(out.join("\n"))
}

fn to_list(data: &Value) -> String {
    match data {
        Value::Array(items) => items
            .iter()
            .map(|item| format!("- {}", cell(item)))
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("- {k}: {}", cell(v)))
            .collect::<Vec<_>>()
            .join("\n"),
        other => format!("- {}", cell(other)),
    }
}

fn csv_field(text: &str) -> String {
    if text.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

fn to_csv(data: &Value) -> Result<String, ToolError> {
    if let Some((rows, columns)) = records(data) {
        let mut lines = vec![columns.iter().map(|c| csv_field(c)).collect::<Vec<_>>().join(",")];
        for row in rows {
            lines.push(
                columns
                    .iter()
                    .map(|c| csv_field(&row.get(c).map(cell).unwrap_or_default()))
                    .collect::<Vec<_>>()
                    .join(","),
            );
        }
        return Ok(lines.join("\n"));
    }
    match data {
        Value::Array(items) => Ok(items
            .iter()
            .map(|item| csv_field(&cell(item)))
            .collect::<Vec<_>>()
            .join("\n")),
        _ => Err(ToolError::InvalidArguments("CSV format requires an array".into())),
    }
}

#[async_trait]
impl Tool for FormatDataTool {
    fn name(&self) -> &str {
        "format_data"
    }

    fn description(&self) -> &str {
        "Format JSON data for display. format_type is one of json, table, list or csv; table needs an array of objects."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "data": {
                    "description": "The data to format (any JSON value, or a JSON string)"
                },
                "format_type": {
                    "type": "string",
                    "enum": ["json", "table", "list", "csv"],
                    "description": "Output format (default json)"
                }
            },
            "required": ["data"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let raw = arguments
            .get("data")
            .filter(|v| !v.is_null())
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'data' argument".into()))?;
        // Models often pass JSON encoded as a string.
        let data = match raw {
            Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| raw.clone()),
            other => other.clone(),
        };

        let output = match arguments["format_type"].as_str().unwrap_or("json") {
            "json" => serde_json::to_string_pretty(&data)
                .map_err(|e| ToolError::InvalidArguments(e.to_string()))?,
            "table" => to_table(&data)?,
            "list" => to_list(&data),
            "csv" => to_csv(&data)?,
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "Unknown format_type '{other}' (expected json, table, list or csv)"
                )));
            }
        };
        Ok(ToolResult::ok(output))
    }
}
