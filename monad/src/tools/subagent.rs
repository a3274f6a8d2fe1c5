//! Subagent launch tool: spawns a child job under the current one.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::model::Job;
use crate::store::Store;

use super::{Tool, ToolCallContent, ToolCallContext, ToolError, ToolSpec};

pub const TOOL_SPAWN_SUBAGENT: &str = "spawn_subagent";

/// Spawns a child job; when the call runs inside a job, the new job is
/// parented under it so cancellation cascades.
pub struct SpawnSubagentTool {
    store: Arc<Store>,
}

impl SpawnSubagentTool {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for SpawnSubagentTool {
    fn id(&self) -> &str {
        TOOL_SPAWN_SUBAGENT
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_SPAWN_SUBAGENT.to_string(),
            description: Some(
                "Launch a subagent as a child job of the current task. The subagent runs \
                 the named agent profile against this session."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "description": {"type": "string", "description": "Task for the subagent."},
                    "agent_id": {"type": "string"}
                },
                "required": ["title", "description", "agent_id"]
            }),
        }
    }

    async fn call(
        &self,
        args: serde_json::Value,
        ctx: Option<&ToolCallContext>,
    ) -> Result<ToolCallContent, ToolError> {
        let session_id = ctx
            .and_then(|c| c.session_id.clone())
            .ok_or_else(|| ToolError::InvalidInput("no session in call context".to_string()))?;
        let title = args
            .get("title")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("missing title".to_string()))?;
        let description = args
            .get("description")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("missing description".to_string()))?;
        let agent_id = args
            .get("agent_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("missing agent_id".to_string()))?;

        let mut job = Job::new(session_id, title, description, agent_id);
        job.parent_id = ctx.and_then(|c| c.parent_job_id.clone());
        self.store.save_job(&job).await?;
        Ok(ToolCallContent {
            text: format!("spawned subagent job {}", job.id),
        })
    }
}
