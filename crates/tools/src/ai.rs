//! Tools that put a question to another model through the provider router:
//! `ask_ai`, `compare_ai_responses`, `ai_translate` and `summarize_text`.
//!
//! Provider failures come back as failed results rather than errors, so the
//! Reactor can observe them and pick another route.

use crate::required_str;
use async_trait::async_trait;
use futures::future::join_all;
use miniluma_core::error::ToolError;
use miniluma_core::tool::{Tool, ToolResult};
use miniluma_providers::{AskReply, ProviderRouter};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::debug;

const DEFAULT_TARGET_LANGUAGE: &str = "English";
const DEFAULT_SUMMARY_LENGTH: u64 = 200;

fn optional_str<'a>(arguments: &'a Value, key: &str) -> Option<&'a str> {
    arguments[key].as_str().map(str::trim).filter(|s| !s.is_empty())
}

fn reply_result(reply: AskReply) -> ToolResult {
    let data = json!({ "provider": reply.provider, "model": reply.model });
    ToolResult::ok(reply.content).with_data(data)
}

pub struct AskAiTool {
    router: Arc<ProviderRouter>,
}

impl AskAiTool {
    pub fn new(router: Arc<ProviderRouter>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl Tool for AskAiTool {
    fn name(&self) -> &str {
        "ask_ai"
    }

    fn description(&self) -> &str {
        "Ask a configured AI model a question and return its answer."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": { "type": "string", "description": "The question to ask" },
                "provider": { "type": "string", "description": "Provider name; the default provider when omitted" },
                "model": { "type": "string", "description": "Model name; the provider's configured model when omitted" },
                "system_prompt": { "type": "string", "description": "Optional system instructions" }
            },
            "required": ["prompt"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let prompt = required_str(&arguments, "prompt")?;
        let provider = optional_str(&arguments, "provider");

        match self
            .router
            .ask(
                provider,
                prompt,
                optional_str(&arguments, "system_prompt"),
                optional_str(&arguments, "model"),
            )
            .await
        {
            Ok(reply) => Ok(reply_result(reply)),
            Err(e) => Ok(ToolResult::failed(format!("Error: {e}"))),
        }
    }
}

pub struct CompareAiResponsesTool {
    router: Arc<ProviderRouter>,
}

impl CompareAiResponsesTool {
    pub fn new(router: Arc<ProviderRouter>) -> Self {
        Self { router }
    }

    /// Every registered provider except the bare mock, unless the mock is
    /// all there is.
    fn default_providers(&self) -> Vec<String> {
        let names: Vec<String> = self
            .router
            .list()
            .into_iter()
            .filter(|n| *n != "mock")
            .map(String::from)
            .collect();
        if names.is_empty() {
            vec!["mock".into()]
        } else {
            names
        }
    }
}

#[async_trait]
impl Tool for CompareAiResponsesTool {
    fn name(&self) -> &str {
        "compare_ai_responses"
    }

    fn description(&self) -> &str {
        "Ask several AI providers the same question and compare their answers side by side."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "prompt": { "type": "string", "description": "The question to ask every provider" },
                "providers": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Provider names; every registered provider when omitted"
                },
                "system_prompt": { "type": "string", "description": "Optional system instructions" }
            },
            "required": ["prompt"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let prompt = required_str(&arguments, "prompt")?;
        let system_prompt = optional_str(&arguments, "system_prompt");

        let providers: Vec<String> = match arguments["providers"].as_array() {
            Some(list) => list.iter().filter_map(Value::as_str).map(String::from).collect(),
            None => self.default_providers(),
        };
        if providers.is_empty() {
            return Err(ToolError::InvalidArguments("'providers' must name at least one provider".into()));
        }

        debug!(providers = ?providers, "Comparing provider answers");
        let answers = join_all(
            providers
                .iter()
                .map(|name| self.router.ask(Some(name.as_str()), prompt, system_prompt, None)),
        )
        .await;

        let mut output = String::new();
        let mut data = Map::new();
        let mut any_ok = false;
        for (name, answer) in providers.iter().zip(answers) {
            let (model, content) = match answer {
                Ok(reply) => {
                    any_ok = true;
                    (reply.model, reply.content)
                }
                Err(e) => ("unknown".to_string(), format!("Error: {e}")),
            };
            output.push_str(&format!("## {name} ({model})\n{content}\n\n"));
            data.insert(name.clone(), json!({ "model": model, "content": content }));
        }

        let output = output.trim_end().to_string();
        let result = if any_ok {
            ToolResult::ok(output)
        } else {
            ToolResult::failed(output)
        };
        Ok(result.with_data(Value::Object(data)))
    }
}

pub struct AiTranslateTool {
    router: Arc<ProviderRouter>,
}

impl AiTranslateTool {
    pub fn new(router: Arc<ProviderRouter>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl Tool for AiTranslateTool {
    fn name(&self) -> &str {
        "ai_translate"
    }

    fn description(&self) -> &str {
        "Translate text into another language with an AI model."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Text to translate" },
                "target_language": { "type": "string", "description": "Language to translate into (default English)" },
                "provider": { "type": "string", "description": "Provider name; the default provider when omitted" }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let text = required_str(&arguments, "text")?;
        let language = optional_str(&arguments, "target_language").unwrap_or(DEFAULT_TARGET_LANGUAGE);

        let prompt = format!("Translate the following text into {language}. Reply with the translation only:\n\n{text}");
        let system = format!(
            "You are a professional translator. Translate accurately into {language} and add no explanations."
        );
        match self
            .router
            .ask(optional_str(&arguments, "provider"), &prompt, Some(&system), None)
            .await
        {
            Ok(reply) => Ok(reply_result(reply)),
            Err(e) => Ok(ToolResult::failed(format!("Translation error: {e}"))),
        }
    }
}

pub struct SummarizeTextTool {
    router: Arc<ProviderRouter>,
}

impl SummarizeTextTool {
    pub fn new(router: Arc<ProviderRouter>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl Tool for SummarizeTextTool {
    fn name(&self) -> &str {
        "summarize_text"
    }

    fn description(&self) -> &str {
        "Summarize text with an AI model, keeping the key information."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "text": { "type": "string", "description": "Text to summarize" },
                "max_length": { "type": "integer", "description": "Maximum summary length in characters (default 200)" },
                "provider": { "type": "string", "description": "Provider name; the default provider when omitted" }
            },
            "required": ["text"]
        })
    }

    async fn execute(&self, arguments: Value) -> Result<ToolResult, ToolError> {
        let text = required_str(&arguments, "text")?;
        let max_length = arguments["max_length"].as_u64().unwrap_or(DEFAULT_SUMMARY_LENGTH);

        let prompt = format!("Summarize the following text in at most {max_length} characters:\n\n{text}");
        let system = "You are a summarization tool. Extract the key information and write a short, plain summary.";
        match self
            .router
            .ask(optional_str(&arguments, "provider"), &prompt, Some(system), None)
            .await
        {
            Ok(reply) => Ok(reply_result(reply)),
            Err(e) => Ok(ToolResult::failed(format!("Summary error: {e}"))),
        }
    }
}
