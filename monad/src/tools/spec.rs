//! Shared tool types: spec, call context, call result, and errors.

use serde::{Deserialize, Serialize};

use crate::model::ChatMessage;

/// Specification of one tool: id, description for the LLM, and the JSON
/// schema of its arguments.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: serde_json::Value,
}

/// Per-call context available to tools during execution.
#[derive(Clone, Debug, Default)]
pub struct ToolCallContext {
    /// Session the call runs within.
    pub session_id: Option<String>,
    /// Job driving this call, when executed by the job runner.
    pub parent_job_id: Option<String>,
    /// Recent conversation messages for tools that need them.
    pub recent_messages: Vec<ChatMessage>,
}

impl ToolCallContext {
    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            parent_job_id: None,
            recent_messages: Vec::new(),
        }
    }
}

/// Tool execution result as text content.
#[derive(Clone, Debug, Default)]
pub struct ToolCallContent {
    pub text: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    /// Tool exists but cannot run where it was resolved (e.g. a custom tool
    /// on a server-hosted workspace).
    #[error("tool execution not supported: {0}")]
    NotSupported(String),
    /// Control signal, not a failure: the owning client must execute this
    /// call and feed the output back through a follow-up turn.
    #[error("client execution required")]
    ClientExecutionRequired,
}

impl From<crate::workspace::WorkspaceError> for ToolError {
    fn from(e: crate::workspace::WorkspaceError) -> Self {
        match e {
            crate::workspace::WorkspaceError::AccessDenied(msg) => ToolError::AccessDenied(msg),
            other => ToolError::ExecutionFailed(other.to_string()),
        }
    }
}

impl From<crate::store::StoreError> for ToolError {
    fn from(e: crate::store::StoreError) -> Self {
        ToolError::ExecutionFailed(e.to_string())
    }
}
