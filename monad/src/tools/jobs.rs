//! Job-queue gateway tool: lets the model enqueue background work for the
//! current session.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::model::Job;
use crate::store::Store;

use super::{Tool, ToolCallContent, ToolCallContext, ToolError, ToolSpec};

pub const TOOL_QUEUE_JOB: &str = "queue_job";

/// Enqueues a job for the calling session.
pub struct QueueJobTool {
    store: Arc<Store>,
    default_agent_id: String,
}

impl QueueJobTool {
    pub fn new(store: Arc<Store>, default_agent_id: impl Into<String>) -> Self {
        Self {
            store,
            default_agent_id: default_agent_id.into(),
        }
    }
}

#[async_trait]
impl Tool for QueueJobTool {
    fn id(&self) -> &str {
        TOOL_QUEUE_JOB
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_QUEUE_JOB.to_string(),
            description: Some(
                "Queue a background job for this session. Runs asynchronously through \
                 the job runner; optional scheduled_at (RFC 3339) defers the run."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "title": {"type": "string"},
                    "description": {"type": "string"},
                    "agent_id": {"type": "string", "description": "Agent profile to run."},
                    "priority": {"type": "integer", "default": 0},
                    "scheduled_at": {"type": "string", "description": "RFC 3339 earliest run time."}
                },
                "required": ["title", "description"]
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
            .unwrap_or(&self.default_agent_id);

        let mut job = Job::new(session_id, title, description, agent_id);
        if let Some(priority) = args.get("priority").and_then(|v| v.as_i64()) {
            job.priority = priority;
        }
        if let Some(at) = args.get("scheduled_at").and_then(|v| v.as_str()) {
            let parsed = DateTime::parse_from_rfc3339(at)
                .map_err(|e| ToolError::InvalidInput(format!("scheduled_at: {}", e)))?;
            job.next_run_at = Some(parsed.with_timezone(&Utc));
        }
        self.store.save_job(&job).await?;
        Ok(ToolCallContent {
            text: format!("queued job {}", job.id),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Queue a job via the tool; the row lands with the
    /// session and schedule.
    #[tokio::test(flavor = "multi_thread")]
    async fn queues_for_session() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let tool = QueueJobTool::new(store.clone(), "default-agent");
        let ctx = ToolCallContext::for_session("s1");

        let out = tool
            .call(
                json!({"title": "summarize", "description": "summarize the repo"}),
                Some(&ctx),
            )
            .await
            .unwrap();
        assert!(out.text.starts_with("queued job "));

        let jobs = store.list_jobs_for_session("s1").await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].agent_id, "default-agent");
    }

    /// **Scenario**: Without a session context the tool refuses.
    #[tokio::test(flavor = "multi_thread")]
    async fn requires_session() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let tool = QueueJobTool::new(store, "a");
        let err = tool
            .call(json!({"title": "t", "description": "d"}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidInput(_)));
    }
}
