//! Prompt text for the reasoning and timeout passes.

use super::action::{IterationRecord, ReactorAction};
use miniluma_core::provider::ToolDefinition;
use miniluma_memory::log::truncate;
use serde_json::Value;

/// Prepended to the system prompt on every reasoning pass.
pub const ACTION_FORMAT: &str = r#"You are an intelligent assistant that answers questions and completes tasks. You can use tools to gather information and act.
Analyse what the user needs and decide whether to answer directly or to use a tool.

Think it through in this order:
1. Understand the question or request
2. Decide whether a tool is needed
3. If so, pick the most suitable tool and give it precise parameters
4. If not, give the final answer

Your response must be valid JSON with one of these formats:

1. To use a tool:
{
  "action_type": "tool_use",
  "tool_name": "tool_name",
  "tool_params": { parameters for the tool },
  "reasoning": "Your reasoning for using this tool"
}

2. To provide a final answer:
{
  "action_type": "final_response",
  "response": "Your response to the user",
  "reasoning": "Your reasoning for this response"
}"#;

pub const FALLBACK_RESPONSE: &str =
    "Sorry, I could not complete this request. Please try a more specific instruction.";

/// `Available tools:` block, or `No tools available.`
pub fn tool_descriptions(tools: &[ToolDefinition]) -> String {
    if tools.is_empty() {
        return "No tools available.".into();
    }

    let mut out = String::from("Available tools:\n\n");
    for tool in tools {
        let description = tool.description.lines().next().unwrap_or_default();
        out.push_str(&format!("- {}: {}\n", tool.name, description));
        out.push_str(&format!("  Parameters: {}\n\n", tool.parameter_summary()));
    }
    out
}

fn inline_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The previous passes of this turn, as the model sees them.
pub fn observation_history(records: &[IterationRecord]) -> String {
    if records.is_empty() {
        return "No previous observations.".into();
    }

    let mut out = String::new();
    for (i, record) in records.iter().enumerate() {
        let reasoning = match record.thought.reasoning() {
            "" => "No reasoning provided",
            r => r,
        };
        out.push_str(&format!("Iteration {}:\n", i + 1));
        out.push_str(&format!("Reasoning: {reasoning}\n"));

        if let ReactorAction::ToolUse {
            tool_name,
            tool_params,
            ..
        } = &record.thought
        {
            let params = tool_params
                .as_object()
                .map(|map| {
                    map.iter()
                        .map(|(k, v)| format!("{k}={}", inline_value(v)))
                        .collect::<Vec<_>>()
                        .join(", ")
                })
                .unwrap_or_else(|| inline_value(tool_params));
            out.push_str(&format!("Action: Use tool '{tool_name}' with parameters {params}\n"));
        }

        if let Some(error) = record.observation.get("error") {
            out.push_str(&format!("Result: Error - {}\n", inline_value(error)));
        } else if let Some(result) = record.observation.get("result") {
            let shown = match result {
                Value::String(s) => truncate(s, 100),
                other => other.to_string(),
            };
            out.push_str(&format!("Result: {shown}\n"));
        }
        out.push('\n');
    }
    out
}

/// The user message of a reasoning pass.
pub fn reasoning_prompt(
    tools: &[ToolDefinition],
    user_input: &str,
    records: &[IterationRecord],
    iteration: usize,
) -> String {
    format!(
        "Handle the user's request one step at a time. On each iteration:\n\
         1. Review the request and the iteration history\n\
         2. Decide whether to use a tool or give the final answer\n\
         3. Reply with a single JSON object in the required format\n\n\
         {tools}\n\
         User request: {user_input}\n\n\
         Iteration history:\n\
         {history}\n\
         Current iteration: {iteration}\n",
        tools = tool_descriptions(tools),
        history = observation_history(records),
    )
}

/// Asks for a best-effort answer once the iteration budget is spent.
pub fn timeout_prompt(max_iterations: usize, user_input: &str, records: &[IterationRecord]) -> String {
    let observations = serde_json::to_string_pretty(records).unwrap_or_else(|_| "[]".into());
    format!(
        "The maximum number of iterations ({max_iterations}) was reached without a final response.\n\
         Original user input: {user_input}\n\n\
         Observations so far:\n\
         {observations}\n\n\
         Based on this information, give the user a helpful final response."
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition() -> ToolDefinition {
        ToolDefinition {
            name: "web_search".into(),
            description: "Search the web.\nSecond line is dropped.".into(),
            parameters: json!({
                "type": "object",
                "properties": {"num_results": {"type": "integer"}, "query": {"type": "string"}},
                "required": ["query"]
            }),
        }
    }

    #[test]
    fn describes_tools() {
        assert_eq!(tool_descriptions(&[]), "No tools available.");
        let text = tool_descriptions(&[definition()]);
        assert!(text.starts_with("Available tools:\n\n- web_search: Search the web.\n"));
        assert!(text.contains("  Parameters: num_results (optional), query (required)\n"));
        assert!(!text.contains("Second line"));
    }

    #[test]
    fn formats_history() {
        assert_eq!(observation_history(&[]), "No previous observations.");

        let records = vec![
            IterationRecord {
                iteration: 1,
                thought: ReactorAction::ToolUse {
                    tool_name: "web_search".into(),
                    tool_params: json!({"num_results": 2, "query": "tokio"}),
                    reasoning: "find docs".into(),
                },
                observation: json!({"result": "x".repeat(150), "success": true}),
            },
            IterationRecord {
                iteration: 2,
                thought: ReactorAction::ToolUse {
                    tool_name: "teleport".into(),
                    tool_params: json!({}),
                    reasoning: String::new(),
                },
                observation: json!({"error": "Tool 'teleport' not found"}),
            },
        ];
        let text = observation_history(&records);
        assert!(text.contains("Iteration 1:\nReasoning: find docs\n"));
        assert!(text.contains("Action: Use tool 'web_search' with parameters num_results=2, query=tokio\n"));
        assert!(text.contains(&format!("Result: {}...\n", "x".repeat(100))));
        assert!(text.contains("Iteration 2:\nReasoning: No reasoning provided\n"));
        assert!(text.contains("Result: Error - Tool 'teleport' not found\n"));
    }

    #[test]
    fn reasoning_prompt_carries_request_line() {
        let prompt = reasoning_prompt(&[definition()], "what is tokio?", &[], 3);
        assert!(prompt.contains("\nUser request: what is tokio?\n"));
        assert!(prompt.contains("No previous observations."));
        assert!(prompt.ends_with("Current iteration: 3\n"));
    }

    #[test]
    fn timeout_prompt_includes_observations() {
        let records = vec![IterationRecord {
            iteration: 1,
            thought: ReactorAction::ToolUse {
                tool_name: "list_files".into(),
                tool_params: json!({}),
                reasoning: "look".into(),
            },
            observation: json!({"result": "a.txt", "success": true}),
        }];
        let prompt = timeout_prompt(4, "tidy up", &records);
        assert!(prompt.contains("(4)"));
        assert!(prompt.contains("Original user input: tidy up"));
        assert!(prompt.contains("\"tool_name\": \"list_files\""));
    }
}
