//! `fetch_webpage`: GET a URL and return its readable text.

use crate::required_str;
use async_trait::async_trait;
use futures::StreamExt;
use miniluma_core::error::ToolError;
use miniluma_core::tool::{Tool, ToolResult};
use regex_lite::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

static SCRIPT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>").expect("valid regex"));
static STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<style\b.*?</style\s*>").expect("valid regex"));
static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").expect("valid regex"));
static BLOCK_END: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)<(?:br\s*/?|/p|/div|/h[1-6]|/li|/tr|/title)>").expect("valid regex")
});
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static BLANKS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid regex"));

/// Raw HTML is read up to this multiple of `max_bytes`, since markup is
/// stripped before the text limit applies.
const HTML_READ_FACTOR: usize = 4;

pub struct FetchWebpageTool {
    client: reqwest::Client,
    max_bytes: usize,
}

impl FetchWebpageTool {
    pub fn new(max_bytes: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("MiniLuma/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client, max_bytes }
    }
}

/// Visible text of an HTML document.
pub fn html_to_text(html: &str) -> String {
    let text = SCRIPT.replace_all(html, " ");
    let text = STYLE.replace_all(&text, " ");
    let text = COMMENT.replace_all(&text, " ");
    let text = BLOCK_END.replace_all(&text, "\n");
    let text = TAG.replace_all(&text, " ");
    let text = decode_entities(&text);

    text.lines()
        .map(|line| BLANKS.replace_all(line.trim(), " ").into_owned())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Read at most `limit` bytes of the body. The flag reports whether the
/// body was cut short.
async fn read_limited(response: reqwest::Response, limit: usize) -> Result<(Vec<u8>, bool), reqwest::Error> {
    let mut body = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let room = limit - body.len();
        if chunk.len() > room {
            body.extend_from_slice(&chunk[..room]);
            return Ok((body, true));
        }
        body.extend_from_slice(&chunk);
    }
    Ok((body, false))
}

/// Cut at a char boundary no later than `max` bytes.
fn truncate_bytes(text: &mut String, max: usize) -> bool {
    if text.len() <= max {
        return false;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text.truncate(end);
    true
}

#[async_trait]
impl Tool for FetchWebpageTool {
    fn name(&self) -> &str {
        "fetch_webpage"
    }

    fn description(&self) -> &str {
        "Fetch a web page over HTTP(S) and return its text content with markup removed."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {
                    "type": "string",
                    "description": "The http:// or https:// URL to fetch"
                }
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let url = required_str(&arguments, "url")?;
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ToolError::InvalidArguments(
                "URL must start with http:// or https://".into(),
            ));
        }

        debug!(url, "Fetching webpage");
        let response = match self.client.get(url).send().await {
            Ok(r) => r,
            Err(e) => return Ok(ToolResult::failed(format!("Failed to fetch {url}: {e}"))),
        };

        let status = response.status();
        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("html"));
        if !status.is_success() {
            return Ok(ToolResult::failed(format!("HTTP {status} from {url}")));
        }

        let read_limit = if is_html {
            self.max_bytes.saturating_mul(HTML_READ_FACTOR)
        } else {
            self.max_bytes
        };
        let (raw, cut_short) = match read_limited(response, read_limit).await {
            Ok(read) => read,
            Err(e) => return Ok(ToolResult::failed(format!("Failed to read body: {e}"))),
        };
        let body = String::from_utf8_lossy(&raw);

        let mut text = if is_html || body.trim_start().starts_with('<') {
            html_to_text(&body)
        } else {
            body.into_owned()
        };
        let truncated = truncate_bytes(&mut text, self.max_bytes) || cut_short;
        if truncated {
            text.push_str("\n...(content truncated)");
        }

        Ok(ToolResult::ok(text).with_data(serde_json::json!({
            "url": url,
            "status": status.as_u16(),
            "truncated": truncated,
        })))
    }
}
