//! Filesystem tools.
//!
//! Reads are safe; writes, deletes and directory creation are sensitive and
//! therefore pause for human approval when invoked by a worker.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;

use crate::error::ToolError;
use crate::tool::Tool;

/// Cap on file content returned to the model.
const MAX_READ_BYTES: u64 = 100 * 1024;

/// Arguments for tools that take a single path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathArgs {
    /// The filesystem path to operate on.
    pub path: String,
}

fn path_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "path": {"type": "string", "description": "Absolute or relative filesystem path"}
        },
        "required": ["path"]
    })
}

/// Lists the entries of a directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListDirectoryTool;

/// One directory entry in a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirEntry {
    /// Entry name.
    pub name: String,
    /// `"file"`, `"dir"` or `"other"`.
    pub kind: String,
    /// Size in bytes for files.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[async_trait]
impl Tool for ListDirectoryTool {
    const NAME: &'static str = "list_directory";
    type Args = PathArgs;
    type Output = Vec<DirEntry>;
    type Error = ToolError;

    fn description(&self) -> String {
        "List the files and directories at a path.".to_owned()
    }

    fn parameters_schema(&self) -> Value {
        path_schema()
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let mut entries = Vec::new();
        let mut reader = fs::read_dir(&args.path).await?;
        while let Some(entry) = reader.next_entry().await? {
            let meta = entry.metadata().await?;
            let kind = if meta.is_dir() {
                "dir"
            } else if meta.is_file() {
                "file"
            } else {
                "other"
            };
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind: kind.to_owned(),
                size: meta.is_file().then(|| meta.len()),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

/// Reads a UTF-8 file, capped at 100 KB.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    const NAME: &'static str = "read_file";
    type Args = PathArgs;
    type Output = String;
    type Error = ToolError;

    fn description(&self) -> String {
        "Read the contents of a text file (up to 100 KB).".to_owned()
    }

    fn parameters_schema(&self) -> Value {
        path_schema()
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        let meta = fs::metadata(&args.path).await?;
        if meta.len() > MAX_READ_BYTES {
            return Err(ToolError::Execution(format!(
                "file is {} bytes, exceeding the {MAX_READ_BYTES} byte limit",
                meta.len()
            )));
        }
        Ok(fs::read_to_string(&args.path).await?)
    }
}

/// Arguments for [`WriteFileTool`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteFileArgs {
    /// Destination path.
    pub path: String,
    /// Content to write.
    pub content: String,
}

/// Writes a file, creating or replacing it.
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteFileTool;

#[async_trait]
impl Tool for WriteFileTool {
    const NAME: &'static str = "write_file";
    type Args = WriteFileArgs;
    type Output = String;
    type Error = ToolError;

    fn description(&self) -> String {
        "Write content to a file, creating or replacing it.".to_owned()
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "Destination path"},
                "content": {"type": "string", "description": "Content to write"}
            },
            "required": ["path", "content"]
        })
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        fs::write(&args.path, args.content.as_bytes()).await?;
        Ok(format!(
            "Wrote {} bytes to {}",
            args.content.len(),
            args.path
        ))
    }
}

/// Deletes a single file.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeleteFileTool;

#[async_trait]
impl Tool for DeleteFileTool {
    const NAME: &'static str = "delete_file";
    type Args = PathArgs;
    type Output = String;
    type Error = ToolError;

    fn description(&self) -> String {
        "Delete a file.".to_owned()
    }

    fn parameters_schema(&self) -> Value {
        path_schema()
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        fs::remove_file(&args.path).await?;
        Ok(format!("Deleted {}", args.path))
    }
}

/// Creates a directory, including missing parents.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateDirectoryTool;

#[async_trait]
impl Tool for CreateDirectoryTool {
    const NAME: &'static str = "create_directory";
    type Args = PathArgs;
    type Output = String;
    type Error = ToolError;

    fn description(&self) -> String {
        "Create a directory, including any missing parent directories.".to_owned()
    }

    fn parameters_schema(&self) -> Value {
        path_schema()
    }

    async fn call(&self, args: Self::Args) -> Result<Self::Output, Self::Error> {
        fs::create_dir_all(&args.path).await?;
        Ok(format!("Created directory {}", args.path))
    }
}
