//! Raw SQL tool: the agent's privileged escape hatch into the store.
//!
//! The database triggers remain the only protection for immutable tables;
//! results come back as a JSON array of row objects.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::store::{SqlOutcome, Store, StoreError};

use super::{Tool, ToolCallContent, ToolCallContext, ToolError, ToolSpec};

pub const TOOL_EXECUTE_SQL: &str = "execute_sql";

/// Executes one SQL statement against the embedded database.
pub struct ExecuteSqlTool {
    store: Arc<Store>,
}

impl ExecuteSqlTool {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for ExecuteSqlTool {
    fn id(&self) -> &str {
        TOOL_EXECUTE_SQL
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_EXECUTE_SQL.to_string(),
            description: Some(
                "Execute a SQL statement against the session database. SELECT returns rows \
                 as a JSON array; other statements return the affected row count."
                    .to_string(),
            ),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "sql": {"type": "string", "description": "The SQL statement to run."}
                },
                "required": ["sql"]
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
        let sql = args
            .get("sql")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::InvalidInput("missing sql".to_string()))?;

        let outcome = self.store.execute_raw(sql).await.map_err(|e| match e {
            StoreError::Immutable(msg) => ToolError::ExecutionFailed(msg),
            other => ToolError::ExecutionFailed(other.to_string()),
        })?;

        let text = match outcome {
            SqlOutcome::Rows(rows) => {
                let objects: Vec<serde_json::Value> = rows.iter().map(|r| r.to_json()).collect();
                serde_json::to_string_pretty(&objects)
                    .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?
            }
            SqlOutcome::Affected(n) => json!({"affected": n}).to_string(),
        };
        Ok(ToolCallContent { text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Session;

    /// **Scenario**: SELECT through the tool yields a JSON array of objects.
    #[tokio::test(flavor = "multi_thread")]
    async fn select_as_json() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store.save_session(&Session::new("s1", "t")).await.unwrap();
        let tool = ExecuteSqlTool::new(store);

        let out = tool
            .call(json!({"sql": "SELECT id FROM session"}), None)
            .await
            .unwrap();
        let rows: Vec<serde_json::Value> = serde_json::from_str(&out.text).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], "s1");
    }

    /// **Scenario**: The immutability triggers hold against the SQL tool.
    #[tokio::test(flavor = "multi_thread")]
    async fn triggers_protect_archived_rows() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store.save_session(&Session::new("s1", "t")).await.unwrap();
        store.archive_session("s1").await.unwrap();
        let tool = ExecuteSqlTool::new(store);

        let err = tool
            .call(json!({"sql": "DELETE FROM session WHERE id='s1'"}), None)
            .await
            .unwrap_err();
        match err {
            ToolError::ExecutionFailed(msg) => assert!(msg.contains("immutable")),
            other => panic!("expected ExecutionFailed, got {:?}", other),
        }
    }
}
