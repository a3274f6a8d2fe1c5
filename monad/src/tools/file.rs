//! Filesystem tools scoped to a workspace jail.
//!
//! Each tool is bound to one live workspace; the jail check happens inside
//! the workspace implementation, so these tools only parse arguments and
//! format results.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::workspace::Workspace;

use super::{Tool, ToolCallContent, ToolCallContext, ToolError, ToolSpec};

pub const TOOL_READ_FILE: &str = "read_file";
pub const TOOL_WRITE_FILE: &str = "write_file";
pub const TOOL_LIST_FILES: &str = "list_files";
pub const TOOL_DELETE_FILE: &str = "delete_file";

fn path_arg(args: &serde_json::Value) -> Result<String, ToolError> {
    args.get("path")
        .and_then(|v| v.as_str())
        .map(String::from)
        .ok_or_else(|| ToolError::InvalidInput("missing path".to_string()))
}

/// Binds a known workspace tool id to a live workspace. Returns `None` for
/// ids that are not file tools.
pub fn bind_known_tool(tool_id: &str, workspace: Arc<dyn Workspace>) -> Option<Arc<dyn Tool>> {
    match tool_id {
        TOOL_READ_FILE => Some(Arc::new(ReadFileTool::new(workspace))),
        TOOL_WRITE_FILE => Some(Arc::new(WriteFileTool::new(workspace))),
        TOOL_LIST_FILES => Some(Arc::new(ListFilesTool::new(workspace))),
        TOOL_DELETE_FILE => Some(Arc::new(DeleteFileTool::new(workspace))),
        _ => None,
    }
}

/// Reads a file inside the workspace.
pub struct ReadFileTool {
    workspace: Arc<dyn Workspace>,
}

impl ReadFileTool {
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn id(&self) -> &str {
        TOOL_READ_FILE
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_READ_FILE.to_string(),
            description: Some("Read a file from the workspace. Path is workspace-relative.".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Workspace-relative file path."}
                },
                "required": ["path"]
            }),
        }
    }

    async fn call(
        &self,
        args: serde_json::Value,
        _ctx: Option<&ToolCallContext>,
    ) -> Result<ToolCallContent, ToolError> {
        let path = path_arg(&args)?;
        let text = self.workspace.read_file(&path).await?;
        Ok(ToolCallContent { text })
    }
}

/// Writes a file inside the workspace (atomic, creates parents).
pub struct WriteFileTool {
    workspace: Arc<dyn Workspace>,
}

impl WriteFileTool {
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn id(&self) -> &str {
        TOOL_WRITE_FILE
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_WRITE_FILE.to_string(),
            description: Some(
                "Write content to a file in the workspace, creating directories as needed."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Workspace-relative file path."},
                    "content": {"type": "string", "description": "Full file content."}
                },
                "required": ["path", "content"]
            }),
        }
    }

    fn requires_permission(&self) -> bool {
        true
    }

    async fn call(
        &self,
        args: serde_json::Value,
        _ctx: Option<&ToolCallContext>,
    ) -> Result<ToolCallContent, ToolError> {
        let path = path_arg(&args)?;
        let content = args
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("missing content".to_string()))?;
        self.workspace.write_file(&path, content).await?;
        Ok(ToolCallContent {
            text: format!("wrote {} bytes to {}", content.len(), path),
        })
    }
}

/// Recursive listing of the workspace.
pub struct ListFilesTool {
    workspace: Arc<dyn Workspace>,
}

impl ListFilesTool {
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn id(&self) -> &str {
        TOOL_LIST_FILES
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_LIST_FILES.to_string(),
            description: Some("List all files in the workspace recursively.".to_string()),
            input_schema: json!({"type": "object", "properties": {}}),
        }
    }

    async fn call(
        &self,
        _args: serde_json::Value,
        _ctx: Option<&ToolCallContext>,
    ) -> Result<ToolCallContent, ToolError> {
        let files = self.workspace.list_files().await?;
        Ok(ToolCallContent {
            text: files.join("\n"),
        })
    }
}

/// Deletes a file inside the workspace.
pub struct DeleteFileTool {
    workspace: Arc<dyn Workspace>,
}

impl DeleteFileTool {
    pub fn new(workspace: Arc<dyn Workspace>) -> Self {
        Self { workspace }
    }
}

#[async_trait]
impl Tool for DeleteFileTool {
    fn id(&self) -> &str {
        TOOL_DELETE_FILE
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_DELETE_FILE.to_string(),
            description: Some("Delete a file from the workspace.".to_string()),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "path": {"type": "string", "description": "Workspace-relative file path."}
                },
                "required": ["path"]
            }),
        }
    }

    fn requires_permission(&self) -> bool {
        true
    }

    async fn call(
        &self,
        args: serde_json::Value,
        _ctx: Option<&ToolCallContext>,
    ) -> Result<ToolCallContent, ToolError> {
        let path = path_arg(&args)?;
        self.workspace.delete_file(&path).await?;
        Ok(ToolCallContent {
            text: format!("deleted {}", path),
        })
    }
}
