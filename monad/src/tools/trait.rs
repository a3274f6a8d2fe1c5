use async_trait::async_trait;

use super::{ToolCallContent, ToolCallContext, ToolError, ToolSpec};

/// Represents a single tool that can be called by the LLM.
///
/// Each tool has a unique id, a specification (description and JSON schema),
/// and the call logic. Tools are registered with [`super::ToolRegistry`] and
/// dispatched through [`super::ToolDispatcher`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique id of this tool; the name the LLM calls it by.
    fn id(&self) -> &str;

    /// Specification used to build prompts and validate calls.
    fn spec(&self) -> ToolSpec;

    /// Whether calls to this tool need the caller's approval first.
    fn requires_permission(&self) -> bool {
        false
    }

    /// Whether the tool can execute in this process right now.
    fn can_execute(&self) -> bool {
        true
    }

    /// Executes the tool.
    ///
    /// # Errors
    ///
    /// [`ToolError`] for invalid arguments, execution failures, or jail
    /// violations; [`ToolError::ClientExecutionRequired`] when the call must
    /// be completed by the owning client.
    async fn call(
        &self,
        args: serde_json::Value,
        ctx: Option<&ToolCallContext>,
    ) -> Result<ToolCallContent, ToolError>;
}
