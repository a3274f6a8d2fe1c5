//! Tool registry and dispatch.
//!
//! A tool is either a system tool (in-process implementation), a workspace
//! tool (declared by a workspace, known-by-id or custom with an inline
//! schema), or a delegating wrapper that forwards execution to the
//! [`ToolDispatcher`]. The dispatcher resolves a named invocation to the
//! right place: in-process, a server workspace, or a remote client.

mod delegating;
mod dispatcher;
mod file;
mod jobs;
mod registry;
mod spec;
mod sql;
mod subagent;
mod r#trait;

pub use delegating::DelegatingTool;
pub use dispatcher::{DispatchOutcome, ToolDispatcher};
pub use file::{
    bind_known_tool, DeleteFileTool, ListFilesTool, ReadFileTool, WriteFileTool, TOOL_DELETE_FILE,
    TOOL_LIST_FILES, TOOL_READ_FILE, TOOL_WRITE_FILE,
};
pub use jobs::{QueueJobTool, TOOL_QUEUE_JOB};
pub use registry::ToolRegistry;
pub use spec::{ToolCallContent, ToolCallContext, ToolError, ToolSpec};
pub use sql::{ExecuteSqlTool, TOOL_EXECUTE_SQL};
pub use subagent::{SpawnSubagentTool, TOOL_SPAWN_SUBAGENT};
pub use r#trait::Tool;
