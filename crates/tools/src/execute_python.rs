//! `execute_python`: run a Python snippet with a timeout.
//!
//! The code is written to a temporary `.py` file and run with the
//! configured interpreter from the workspace directory. The child is
//! killed if it outlives the timeout.

use crate::required_str;
use async_trait::async_trait;
use miniluma_core::error::ToolError;
use miniluma_core::tool::{Tool, ToolResult};
use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

pub struct ExecutePythonTool {
    interpreter: String,
    timeout: Duration,
    working_dir: PathBuf,
}

impl ExecutePythonTool {
    pub fn new(interpreter: impl Into<String>, timeout_secs: u64, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            timeout: Duration::from_secs(timeout_secs.max(1)),
            working_dir: working_dir.into(),
        }
    }

    fn failed(&self, reason: impl Into<String>) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: "execute_python".into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Tool for ExecutePythonTool {
    fn name(&self) -> &str {
        "execute_python"
    }

    fn description(&self) -> &str {
        "Execute Python code and return its stdout, stderr and exit code. Use print() to produce output."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "description": "The Python source code to run"
                }
            },
            "required": ["code"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let code = required_str(&arguments, "code")?;

        let mut script = tempfile::Builder::new()
            .prefix("miniluma_")
            .suffix(".py")
            .tempfile()
            .map_err(|e| self.failed(format!("cannot create script file: {e}")))?;
        script
            .write_all(code.as_bytes())
            .and_then(|_| script.flush())
            .map_err(|e| self.failed(format!("cannot write script file: {e}")))?;

        let mut command = Command::new(&self.interpreter);
        command
            .arg(script.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if self.working_dir.is_dir() {
            command.current_dir(&self.working_dir);
        }

        debug!(interpreter = %self.interpreter, bytes = code.len(), "Running Python");
        let child = command
            .spawn()
            .map_err(|e| self.failed(format!("cannot start '{}': {e}", self.interpreter)))?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| self.failed(e.to_string()))?,
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Python execution timed out");
                return Err(ToolError::Timeout {
                    tool_name: "execute_python".into(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let code = output.status.code().unwrap_or(-1);

        let mut text = stdout.trim_end().to_string();
        if !stderr.trim().is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str("[stderr]\n");
            text.push_str(stderr.trim_end());
        }
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&format!("[exit code: {code}]"));

        let result = serde_json::json!({
            "stdout": stdout,
            "stderr": stderr,
            "exit_code": code,
        });
        if output.status.success() {
            Ok(ToolResult::ok(text).with_data(result))
        } else {
            Ok(ToolResult::failed(text).with_data(result))
        }
    }
}
