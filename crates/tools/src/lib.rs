//! Built-in tool implementations for MiniLuma.
//!
//! Tools give the Reactor the ability to act: search the web, fetch pages,
//! run Python, read and write files in the workspace, and reshape data.
//! File tools share one [`PathPolicy`] sandbox. The AI tools in [`ai`]
//! need a provider router and are added by [`registry_with_providers`].

pub mod ai;
pub mod datetime;
pub mod execute_python;
pub mod fetch_webpage;
pub mod file_read;
pub mod file_write;
pub mod format_data;
pub mod json_parser;
pub mod list_files;
pub mod path;
pub mod web_search;

pub use path::{PathPolicy, PathViolation};

use miniluma_config::ToolsConfig;
use miniluma_core::error::ToolError;
use miniluma_core::tool::{Tool, ToolRegistry};
use miniluma_providers::ProviderRouter;
use std::sync::Arc;
use tracing::{debug, warn};

/// Names of every built-in tool, in registration order.
pub const BUILTIN_TOOLS: [&str; 9] = [
    "web_search",
    "fetch_webpage",
    "read_file",
    "write_file",
    "list_files",
    "execute_python",
    "get_current_datetime",
    "json_parser",
    "format_data",
];

/// Tools backed by the provider router.
pub const AI_TOOLS: [&str; 4] = ["ask_ai", "compare_ai_responses", "ai_translate", "summarize_text"];

/// A required string argument.
pub(crate) fn required_str<'a>(arguments: &'a serde_json::Value, key: &str) -> Result<&'a str, ToolError> {
    arguments[key]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{key}' argument")))
}

/// Every built-in tool with default settings.
pub fn default_registry() -> ToolRegistry {
    registry_from_config(&ToolsConfig::default())
}

/// The workspace sandbox described by `config`: the workspace plus
/// `allowed_roots`, minus `forbidden_paths`.
pub fn policy_from_config(config: &ToolsConfig) -> PathPolicy {
    let policy = config
        .allowed_roots
        .iter()
        .fold(PathPolicy::new(&config.workspace_dir), |p, root| p.allow(root));
    config
        .forbidden_paths
        .iter()
        .fold(policy, |p, prefix| p.forbid(prefix))
}

/// The `enabled` subset of the built-ins (all of them when empty),
/// configured from `config`.
pub fn registry_from_config(config: &ToolsConfig) -> ToolRegistry {
    let policy = Arc::new(policy_from_config(config));

    let tools: Vec<Box<dyn Tool>> = vec![
        Box::new(web_search::WebSearchTool::new(
            config.search_endpoint.clone(),
            config.search_api_key.clone(),
        )),
        Box::new(fetch_webpage::FetchWebpageTool::new(config.fetch_max_bytes)),
        Box::new(file_read::ReadFileTool::new(policy.clone())),
        Box::new(file_write::WriteFileTool::new(policy.clone())),
        Box::new(list_files::ListFilesTool::new(policy.clone())),
        Box::new(execute_python::ExecutePythonTool::new(
            config.python_command.clone(),
            config.execution_timeout_secs,
            policy.workspace().to_path_buf(),
        )),
        Box::new(datetime::DateTimeTool),
        Box::new(json_parser::JsonParserTool),
        Box::new(format_data::FormatDataTool),
    ];

    for name in &config.enabled {
        if !BUILTIN_TOOLS.contains(&name.as_str()) && !AI_TOOLS.contains(&name.as_str()) {
            warn!(tool = %name, "Unknown tool in tools.enabled; ignoring");
        }
    }

    let mut registry = ToolRegistry::new();
    register_enabled(&mut registry, tools, &config.enabled);
    debug!(tools = ?registry.names(), "Tool registry built");
    registry
}

/// [`registry_from_config`] plus the AI tools, which ask other models
/// through `providers`.
pub fn registry_with_providers(config: &ToolsConfig, providers: Arc<ProviderRouter>) -> ToolRegistry {
    let mut registry = registry_from_config(config);
    let tools: Vec<Box<dyn Tool>> = vec![
        Box::new(ai::AskAiTool::new(providers.clone())),
        Box::new(ai::CompareAiResponsesTool::new(providers.clone())),
        Box::new(ai::AiTranslateTool::new(providers.clone())),
        Box::new(ai::SummarizeTextTool::new(providers)),
    ];
    register_enabled(&mut registry, tools, &config.enabled);
    debug!(tools = registry.len(), "AI tools registered");
    registry
}

/// Register the tools named in `enabled`, or all of them when it is empty.
fn register_enabled(registry: &mut ToolRegistry, tools: Vec<Box<dyn Tool>>, enabled: &[String]) {
    for tool in tools {
        if enabled.is_empty() || enabled.iter().any(|n| n == tool.name()) {
            registry.register(tool);
        }
    }
}

/// Minimal one-shot HTTP server for tool tests.
#[cfg(test)]
pub(crate) mod test_server {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve a single request with `body`. Returns the base URL and a
    /// handle resolving to the raw request head.
    pub async fn serve_once(content_type: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&head).into_owned()
        });

        (url, handle)
    }
}
