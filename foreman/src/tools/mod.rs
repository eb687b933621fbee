//! Stock tools bound by the stock workers.
//!
//! The engine itself accepts any [`crate::tool::ToolRegistry`]; these are
//! the tools the four stock workers register, together with their default
//! sensitivities.
//!
//! # Tool categories
//!
//! - **Filesystem**: `list_directory`, `read_file` (safe); `write_file`,
//!   `delete_file`, `create_directory` (sensitive)
//! - **System**: `get_system_info` (safe); `execute_command` (classified
//!   per command)
//! - **Code**: `analyze_code` (safe, prompt-only)

mod code;
mod filesystem;
mod shell;
mod system;

pub use code::{AnalyzeCodeArgs, AnalyzeCodeTool};
pub use filesystem::{
    CreateDirectoryTool, DeleteFileTool, ListDirectoryTool, PathArgs, ReadFileTool,
    WriteFileArgs, WriteFileTool,
};
pub use shell::{ExecuteCommandArgs, ExecuteCommandTool};
pub use system::SystemInfoTool;

use crate::tool::{Sensitivity, ToolRegistry};

/// Names of all stock tools.
pub const STOCK_TOOL_NAMES: &[&str] = &[
    "list_directory",
    "read_file",
    "write_file",
    "delete_file",
    "create_directory",
    "get_system_info",
    "execute_command",
    "analyze_code",
];

/// Build the registry for the filesystem worker.
#[must_use]
pub fn filesystem_registry() -> ToolRegistry {
    let mut reg = ToolRegistry::new();
    reg.add(ListDirectoryTool, Sensitivity::Safe);
    reg.add(ReadFileTool, Sensitivity::Safe);
    reg.add(WriteFileTool, Sensitivity::Sensitive);
    reg.add(DeleteFileTool, Sensitivity::Sensitive);
    reg.add(CreateDirectoryTool, Sensitivity::Sensitive);
    reg
}

/// Build the registry for the system worker.
#[must_use]
pub fn system_registry() -> ToolRegistry {
    let mut reg = ToolRegistry::new();
    reg.add(SystemInfoTool, Sensitivity::Safe);
    reg.add_command_tool(ExecuteCommandTool::new());
    reg
}

/// Build the registry for the researcher worker.
#[must_use]
pub fn researcher_registry() -> ToolRegistry {
    let mut reg = ToolRegistry::new();
    reg.add(ListDirectoryTool, Sensitivity::Safe);
    reg.add(ReadFileTool, Sensitivity::Safe);
    reg
}

/// Build the registry for the code worker.
#[must_use]
pub fn code_registry() -> ToolRegistry {
    let mut reg = ToolRegistry::new();
    reg.add(AnalyzeCodeTool, Sensitivity::Safe);
    reg.add(ReadFileTool, Sensitivity::Safe);
    reg.add(WriteFileTool, Sensitivity::Sensitive);
    reg
}
