//! System information tool.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ToolError;
use crate::tool::Tool;

/// Arguments for [`SystemInfoTool`] (none).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct NoArgs {}

/// A snapshot of host facts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Operating system name.
    pub os: String,
    /// CPU architecture.
    pub arch: String,
    /// OS family (`"unix"` or `"windows"`).
    pub family: String,
    /// Host name, when the environment exposes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    /// The user's home directory, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub home_dir: Option<String>,
    /// Available parallelism (logical CPUs).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpus: Option<usize>,
}

/// Reports read-only facts about the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInfoTool;

#[async_trait]
impl Tool for SystemInfoTool {
    const NAME: &'static str = "get_system_info";
    type Args = NoArgs;
    type Output = SystemInfo;
    type Error = ToolError;

    fn description(&self) -> String {
        "Get information about the host: OS, architecture, home directory.".to_owned()
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    async fn call(&self, _args: Self::Args) -> Result<Self::Output, Self::Error> {
        Ok(SystemInfo {
            os: std::env::consts::OS.to_owned(),
            arch: std::env::consts::ARCH.to_owned(),
            family: std::env::consts::FAMILY.to_owned(),
            hostname: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("COMPUTERNAME"))
                .ok(),
            home_dir: std::env::var("HOME")
                .or_else(|_| std::env::var("USERPROFILE"))
                .ok(),
            cpus: std::thread::available_parallelism().map(usize::from).ok(),
        })
    }
}
