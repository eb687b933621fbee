//! Shell execution tool.
//!
//! Runs a single command line through the platform shell with a time budget
//! and a bounded output size. Sensitivity is not fixed here; the registry
//! classifies each command through [`crate::shell::CommandClassifier`]
//! before the worker decides whether to execute or defer it.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command;

use crate::error::ToolError;
use crate::tool::Tool;

/// Default time budget for one command.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default cap on captured output.
const DEFAULT_MAX_OUTPUT_BYTES: usize = 100 * 1024;

/// Arguments for [`ExecuteCommandTool`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteCommandArgs {
    /// The command line to run.
    pub command: String,
}

/// Runs a whitelisted shell command with timeout and output bounds.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteCommandTool {
    timeout_secs: u64,
    max_output_bytes: usize,
}

impl ExecuteCommandTool {
    /// Create a tool with the default 30 s timeout and 100 KB output cap.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    /// Override the time budget.
    #[must_use]
    pub const fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Override the output cap.
    #[must_use]
    pub const fn with_max_output_bytes(mut self, bytes: usize) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    fn truncate(&self, mut text: String) -> String {
        if text.len() > self.max_output_bytes {
            let mut cut = self.max_output_bytes;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
            text.push_str("\n… [output truncated]");
        }
        text
    }
}

impl Default for ExecuteCommandTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ExecuteCommandTool {
    const NAME: &'static str = "execute_command";
    type Args = ExecuteCommandArgs;
    type Output = String;
    type Error = ToolError;

    fn description(&self) -> String {
        "Execute a whitelisted shell command and return its output.".to_owned()
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "The command line to run"}
            },
            "required": ["command"]
        })
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        #[cfg(target_os = "windows")]
        let mut cmd = {
            let mut c = Command::new("cmd");
            c.args(["/C", &args.command]);
            c
        };
        #[cfg(not(target_os = "windows"))]
        let mut cmd = {
            let mut c = Command::new("sh");
            c.args(["-c", &args.command]);
            c
        };

        let output = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            cmd.kill_on_drop(true).output(),
        )
        .await
        .map_err(|_| ToolError::Timeout(self.timeout_secs))??;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        let mut text = stdout.into_owned();
        if !stderr.is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&stderr);
        }

        if !output.status.success() {
            return Err(ToolError::Execution(format!(
                "exit status {}: {}",
                output.status.code().unwrap_or(-1),
                self.truncate(text)
            )));
        }

        Ok(self.truncate(text))
    }
}
