//! Tool dispatcher: routes a named invocation to the right executor.
//!
//! Resolution order for `(reference, args, session_id)`:
//! 1. A known system tool id executes in-process.
//! 2. Otherwise the owning workspace is looked up among the session's
//!    primary, attached, and client-owned workspaces. Server-hosted owners
//!    execute known tools bound to that workspace; client-hosted owners are
//!    routed over the connection manager when connected, and defer to the
//!    interactive client (`ClientExecutionRequired`) when not.
//! 3. No resolvable owner fails with `NotFound`.

use std::sync::Arc;

use serde_json::Value;

use crate::client::ClientConnectionManager;
use crate::model::{HostType, WorkspaceToolRecord};
use crate::store::Store;
use crate::workspace::WorkspaceStore;

use super::{bind_known_tool, ToolCallContext, ToolError, ToolRegistry};

/// Outcome of one dispatch.
#[derive(Clone, Debug)]
pub enum DispatchOutcome {
    /// Tool ran; the text result feeds the next loop iteration.
    Completed(String),
    /// The owning client must run this call; the engine suspends the loop
    /// and waits for tool outputs on a follow-up turn.
    ClientExecutionRequired,
}

/// Routes tool invocations to system tools, server workspaces, or remote
/// clients.
pub struct ToolDispatcher {
    system: ToolRegistry,
    store: Arc<Store>,
    workspaces: Arc<WorkspaceStore>,
    connections: Arc<ClientConnectionManager>,
}

impl ToolDispatcher {
    pub fn new(
        system: ToolRegistry,
        store: Arc<Store>,
        workspaces: Arc<WorkspaceStore>,
        connections: Arc<ClientConnectionManager>,
    ) -> Self {
        Self {
            system,
            store,
            workspaces,
            connections,
        }
    }

    /// The in-process tool registry.
    pub fn system(&self) -> &ToolRegistry {
        &self.system
    }

    /// Workspace ids visible to a session: primary, attached, then every
    /// client-owned workspace.
    async fn candidate_workspace_ids(&self, session_id: &str) -> Result<Vec<String>, ToolError> {
        let session = self
            .store
            .get_session(session_id)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
        let mut ids = session.workspace_ids();
        for client in self.store.list_clients().await? {
            for ws in self.store.list_workspaces_for_client(&client.id).await? {
                if !ids.contains(&ws.id) {
                    ids.push(ws.id.clone());
                }
            }
        }
        Ok(ids)
    }

    /// Finds the workspace declaring `reference` among the candidates.
    async fn find_owner(
        &self,
        reference: &str,
        session_id: &str,
    ) -> Result<Option<(String, WorkspaceToolRecord)>, ToolError> {
        for ws_id in self.candidate_workspace_ids(session_id).await? {
            let tools = self.store.list_workspace_tools(&ws_id).await?;
            if let Some(decl) = tools.into_iter().find(|t| t.tool_id == reference) {
                return Ok(Some((ws_id, decl)));
            }
        }
        Ok(None)
    }

    /// Dispatches one invocation. See module docs for the resolution order.
    pub async fn dispatch(
        &self,
        reference: &str,
        args: Value,
        session_id: &str,
    ) -> Result<DispatchOutcome, ToolError> {
        if self.system.contains(reference) {
            let ctx = ToolCallContext::for_session(session_id);
            let out = self.system.call(reference, args, Some(&ctx)).await?;
            return Ok(DispatchOutcome::Completed(out.text));
        }

        let Some((ws_id, decl)) = self.find_owner(reference, session_id).await? else {
            return Err(ToolError::NotFound(reference.to_string()));
        };

        let record = self
            .store
            .get_workspace(&ws_id)
            .await
            .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;

        match record.host_type {
            HostType::Server | HostType::ServerSession => {
                if !decl.is_known {
                    return Err(ToolError::NotSupported(format!(
                        "custom tool {} on server workspace {}",
                        reference, ws_id
                    )));
                }
                let workspace = self
                    .workspaces
                    .get(&ws_id)
                    .await
                    .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
                let tool = bind_known_tool(reference, workspace)
                    .ok_or_else(|| ToolError::NotFound(reference.to_string()))?;
                let ctx = ToolCallContext::for_session(session_id);
                let out = tool.call(args, Some(&ctx)).await?;
                Ok(DispatchOutcome::Completed(out.text))
            }
            HostType::Client => {
                let Some(owner) = record.owner_client_id.as_deref() else {
                    return Err(ToolError::ExecutionFailed(format!(
                        "client workspace {} has no owner",
                        ws_id
                    )));
                };
                if !self.connections.is_connected(owner) {
                    return Ok(DispatchOutcome::ClientExecutionRequired);
                }
                let result = self
                    .connections
                    .send(reference, args, owner)
                    .await
                    .map_err(|e| ToolError::ExecutionFailed(e.to_string()))?;
                let text = match result {
                    Value::String(s) => s,
                    other => other.to_string(),
                };
                Ok(DispatchOutcome::Completed(text))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Session, WorkspaceRecord};
    use crate::tools::{ExecuteSqlTool, TOOL_EXECUTE_SQL};

    async fn fixture() -> (Arc<Store>, Arc<WorkspaceStore>, Arc<ClientConnectionManager>) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let connections = Arc::new(ClientConnectionManager::new());
        let workspaces = Arc::new(WorkspaceStore::new(store.clone(), connections.clone()));
        store.save_session(&Session::new("s1", "t")).await.unwrap();
        (store, workspaces, connections)
    }

    /// **Scenario**: A system tool id executes in-process.
    #[tokio::test(flavor = "multi_thread")]
    async fn system_tool_inline() {
        let (store, workspaces, connections) = fixture().await;
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(ExecuteSqlTool::new(store.clone())));
        let dispatcher = ToolDispatcher::new(registry, store, workspaces, connections);

        let outcome = dispatcher
            .dispatch(
                TOOL_EXECUTE_SQL,
                serde_json::json!({"sql": "SELECT 1 AS one"}),
                "s1",
            )
            .await
            .unwrap();
        match outcome {
            DispatchOutcome::Completed(text) => assert!(text.contains("one")),
            other => panic!("expected Completed, got {:?}", other),
        }
    }

    /// **Scenario**: A known tool owned by an attached server workspace
    /// executes against that workspace's jail.
    #[tokio::test(flavor = "multi_thread")]
    async fn server_workspace_tool() {
        let (store, workspaces, connections) = fixture().await;
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "from workspace").unwrap();

        let mut record = WorkspaceRecord::new(
            format!("monad-test:{}", dir.path().display()),
            HostType::Server,
        );
        record.root_path = Some(dir.path().display().to_string());
        store.save_workspace(&record).await.unwrap();
        store
            .save_workspace_tool(&WorkspaceToolRecord {
                id: "wt1".into(),
                workspace_id: record.id.clone(),
                tool_id: "read_file".into(),
                is_known: true,
                schema: None,
                description: None,
            })
            .await
            .unwrap();

        let mut session = store.get_session("s1").await.unwrap();
        session.attached_workspace_ids = vec![record.id.clone()];
        store.save_session(&session).await.unwrap();

        let dispatcher =
            ToolDispatcher::new(ToolRegistry::new(), store, workspaces, connections);
        let outcome = dispatcher
            .dispatch("read_file", serde_json::json!({"path": "hello.txt"}), "s1")
            .await
            .unwrap();
        match outcome {
            DispatchOutcome::Completed(text) => assert_eq!(text, "from workspace"),
            other => panic!("expected Completed, got {:?}", other),
        }
    }

    /// **Scenario**: A tool owned by a disconnected client defers to client
    /// execution.
    #[tokio::test(flavor = "multi_thread")]
    async fn client_tool_defers_when_disconnected() {
        let (store, workspaces, connections) = fixture().await;
        let mut record = WorkspaceRecord::new("laptop:/p", HostType::Client);
        record.owner_client_id = Some("laptop-1".into());
        store.save_workspace(&record).await.unwrap();
        store
            .save_workspace_tool(&WorkspaceToolRecord {
                id: "wt2".into(),
                workspace_id: record.id.clone(),
                tool_id: "open_editor".into(),
                is_known: false,
                schema: Some(serde_json::json!({"type": "object"})),
                description: Some("Opens the client's editor".into()),
            })
            .await
            .unwrap();

        let mut session = store.get_session("s1").await.unwrap();
        session.primary_workspace_id = Some(record.id.clone());
        store.save_session(&session).await.unwrap();

        let dispatcher =
            ToolDispatcher::new(ToolRegistry::new(), store, workspaces, connections);
        let outcome = dispatcher
            .dispatch("open_editor", serde_json::json!({}), "s1")
            .await
            .unwrap();
        assert!(matches!(outcome, DispatchOutcome::ClientExecutionRequired));
    }

    /// **Scenario**: With the owning client connected, the call routes over
    /// the connection manager and returns its JSON text.
    #[tokio::test(flavor = "multi_thread")]
    async fn client_tool_routes_when_connected() {
        let (store, workspaces, connections) = fixture().await;
        let mut record = WorkspaceRecord::new("laptop:/p", HostType::Client);
        record.owner_client_id = Some("laptop-1".into());
        store.save_workspace(&record).await.unwrap();
        store
            .save_workspace_tool(&WorkspaceToolRecord {
                id: "wt3".into(),
                workspace_id: record.id.clone(),
                tool_id: "battery_level".into(),
                is_known: false,
                schema: Some(serde_json::json!({"type": "object"})),
                description: None,
            })
            .await
            .unwrap();

        let mut session = store.get_session("s1").await.unwrap();
        session.primary_workspace_id = Some(record.id.clone());
        store.save_session(&session).await.unwrap();

        let (tx, mut rx) = tokio::sync::mpsc::channel::<String>(4);
        connections.register("laptop-1", tx);
        let conn_clone = connections.clone();
        let responder = tokio::spawn(async move {
            let frame = rx.recv().await.unwrap();
            let request: Value = serde_json::from_str(&frame).unwrap();
            assert_eq!(request["method"], "battery_level");
            conn_clone.handle_frame(
                &serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": request["id"],
                    "result": "87%",
                })
                .to_string(),
            );
        });

        let dispatcher =
            ToolDispatcher::new(ToolRegistry::new(), store, workspaces, connections);
        let outcome = dispatcher
            .dispatch("battery_level", serde_json::json!({}), "s1")
            .await
            .unwrap();
        match outcome {
            DispatchOutcome::Completed(text) => assert_eq!(text, "87%"),
            other => panic!("expected Completed, got {:?}", other),
        }
        responder.await.unwrap();
    }

    /// **Scenario**: No resolvable owner fails with NotFound.
    #[tokio::test(flavor = "multi_thread")]
    async fn unresolvable_is_not_found() {
        let (store, workspaces, connections) = fixture().await;
        let dispatcher =
            ToolDispatcher::new(ToolRegistry::new(), store, workspaces, connections);
        let err = dispatcher
            .dispatch("nope", serde_json::json!({}), "s1")
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }
}
