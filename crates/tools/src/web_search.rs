//! `web_search`: query a JSON search endpoint, or return deterministic
//! offline results when none is configured.
//!
//! The endpoint is called as `GET {endpoint}?q=...&count=N` and must answer
//! with `{"results": [{"title", "url", "snippet"}]}`. Offline results let the
//! Reactor loop run end-to-end without network access.

use crate::required_str;
use async_trait::async_trait;
use miniluma_core::error::ToolError;
use miniluma_core::tool::{Tool, ToolResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const DEFAULT_RESULTS: u64 = 5;
const MAX_RESULTS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

pub struct WebSearchTool {
    endpoint: Option<String>,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl WebSearchTool {
    /// Offline search.
    pub fn offline() -> Self {
        Self::new(None, None)
    }

    pub fn new(endpoint: Option<String>, api_key: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self {
            endpoint,
            api_key,
            client,
        }
    }

    async fn search_remote(
        &self,
        endpoint: &str,
        query: &str,
        count: usize,
    ) -> Result<Vec<SearchResult>, ToolError> {
        let fail = |reason: String| ToolError::ExecutionFailed {
            tool_name: "web_search".into(),
            reason,
        };

        let mut request = self
            .client
            .get(endpoint)
            .query(&[("q", query.to_string()), ("count", count.to_string())]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        debug!(endpoint, query, count, "Remote web search");
        let response = request.send().await.map_err(|e| fail(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(fail(format!("search endpoint returned {status}")));
        }
        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| fail(format!("invalid search response: {e}")))?;

        Ok(parsed.results.into_iter().take(count).collect())
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for information. Returns a list of relevant results with titles, URLs, and snippets."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The search query"
                },
                "num_results": {
                    "type": "integer",
                    "description": "Number of results to return (default 5, max 10)",
                    "default": DEFAULT_RESULTS
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let query = required_str(&arguments, "query")?;
        let count = arguments["num_results"]
            .as_u64()
            .unwrap_or(DEFAULT_RESULTS)
            .clamp(1, MAX_RESULTS) as usize;

        let results = match &self.endpoint {
            Some(endpoint) => self.search_remote(endpoint, query, count).await?,
            None => offline_results(query, count),
        };

        if results.is_empty() {
            return Ok(ToolResult::ok(format!("No results found for '{query}'"))
                .with_data(serde_json::json!([])));
        }

        let data = serde_json::to_value(&results)
            .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;
        Ok(ToolResult::ok(render(&results)).with_data(data))
    }
}

fn render(results: &[SearchResult]) -> String {
    results
        .iter()
        .enumerate()
        .map(|(i, r)| format!("{}. {}\n   {}\n   {}", i + 1, r.title, r.url, r.snippet))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn result(title: &str, url: &str, snippet: &str) -> SearchResult {
    SearchResult {
        title: title.into(),
        url: url.into(),
        snippet: snippet.into(),
    }
}

fn offline_results(query: &str, count: usize) -> Vec<SearchResult> {
    let q = query.to_lowercase();

    let topics: [(&str, Vec<SearchResult>); 3] = [
        ("python", vec![
            result(
                "Welcome to Python.org",
                "https://www.python.org/",
                "The official home of the Python Programming Language.",
            ),
            result(
                "The Python Tutorial",
                "https://docs.python.org/3/tutorial/",
                "An informal introduction to the basic concepts and features of the Python language.",
            ),
        ]),
        ("html", vec![
            result(
                "HTML: HyperText Markup Language | MDN",
                "https://developer.mozilla.org/en-US/docs/Web/HTML",
                "HTML is the most basic building block of the Web. It defines the meaning and structure of web content.",
            ),
            result(
                "CSS: Cascading Style Sheets | MDN",
                "https://developer.mozilla.org/en-US/docs/Web/CSS",
                "CSS is a stylesheet language used to describe the presentation of a document written in HTML.",
            ),
        ]),
        ("rust", vec![
            result(
                "The Rust Programming Language",
                "https://doc.rust-lang.org/book/",
                "Rust is a systems programming language focused on safety, speed, and concurrency.",
            ),
            result(
                "crates.io: Rust Package Registry",
                "https://crates.io/",
                "The Rust community's crate registry for sharing and discovering Rust libraries.",
            ),
        ]),
    ];

    let mut results: Vec<SearchResult> = topics
        .into_iter()
        .filter(|(keyword, _)| q.contains(keyword))
        .flat_map(|(_, hits)| hits)
        .collect();

    let encoded = query.split_whitespace().collect::<Vec<_>>().join("+");
    let mut page = 1;
    while results.len() < count {
        results.push(SearchResult {
            title: format!("Result {page} for: {query}"),
            url: format!("https://example.com/search?q={encoded}&p={page}"),
            snippet: format!("Offline search result for '{query}'. Configure a search endpoint for live results."),
        });
        page += 1;
    }

    results.truncate(count);
    results
}
