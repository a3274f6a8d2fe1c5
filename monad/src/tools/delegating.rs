//! Delegating tool: the chat engine's uniform handle over any tool.
//!
//! Carries the spec for prompting and forwards execution to the dispatcher
//! with `(reference, arguments, session_id)`. A deferred client execution
//! surfaces as [`ToolError::ClientExecutionRequired`] for the engine to
//! catch.

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    DispatchOutcome, Tool, ToolCallContent, ToolCallContext, ToolDispatcher, ToolError, ToolSpec,
};

/// Wrapper forwarding execution to the [`ToolDispatcher`].
pub struct DelegatingTool {
    spec: ToolSpec,
    session_id: String,
    dispatcher: Arc<ToolDispatcher>,
}

impl DelegatingTool {
    pub fn new(spec: ToolSpec, session_id: impl Into<String>, dispatcher: Arc<ToolDispatcher>) -> Self {
        Self {
            spec,
            session_id: session_id.into(),
            dispatcher,
        }
    }
}

#[async_trait]
impl Tool for DelegatingTool {
    fn id(&self) -> &str {
        &self.spec.name
    }

    fn spec(&self) -> ToolSpec {
        self.spec.clone()
    }

    async fn call(
        &self,
        args: serde_json::Value,
        _ctx: Option<&ToolCallContext>,
    ) -> Result<ToolCallContent, ToolError> {
        match self
            .dispatcher
            .dispatch(&self.spec.name, args, &self.session_id)
            .await?
        {
            DispatchOutcome::Completed(text) => Ok(ToolCallContent { text }),
            DispatchOutcome::ClientExecutionRequired => Err(ToolError::ClientExecutionRequired),
        }
    }
}
