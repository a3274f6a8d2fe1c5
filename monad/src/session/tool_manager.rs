//! Per-session tool manager: aggregates the tools visible to one session.
//!
//! Aggregation order is system tools, then dynamically active context tools,
//! then workspace tools from registered workspaces; duplicates by id are
//! dropped with first-seen winning. Workspace tools execute through a
//! [`DelegatingTool`] so routing stays in the dispatcher.

use std::sync::{Arc, Mutex};

use crate::store::Store;
use crate::tools::{DelegatingTool, Tool, ToolDispatcher, ToolError, ToolSpec};

/// Dynamically active tools injected for the current tool context (for
/// example a document the user has open).
#[derive(Default)]
pub struct ToolContextSession {
    active: Mutex<Vec<Arc<dyn Tool>>>,
}

impl ToolContextSession {
    pub fn set_active(&self, tools: Vec<Arc<dyn Tool>>) {
        if let Ok(mut guard) = self.active.lock() {
            *guard = tools;
        }
    }

    pub fn clear(&self) {
        self.set_active(Vec::new());
    }

    pub fn active(&self) -> Vec<Arc<dyn Tool>> {
        self.active.lock().map(|g| g.clone()).unwrap_or_default()
    }
}

/// Aggregates system, context, and workspace tools for one session.
pub struct SessionToolManager {
    session_id: String,
    store: Arc<Store>,
    dispatcher: Arc<ToolDispatcher>,
    context_session: ToolContextSession,
    registered_workspaces: Mutex<Vec<String>>,
}

impl SessionToolManager {
    pub fn new(session_id: impl Into<String>, store: Arc<Store>, dispatcher: Arc<ToolDispatcher>) -> Self {
        Self {
            session_id: session_id.into(),
            store,
            dispatcher,
            context_session: ToolContextSession::default(),
            registered_workspaces: Mutex::new(Vec::new()),
        }
    }

    pub fn context_session(&self) -> &ToolContextSession {
        &self.context_session
    }

    /// Makes a workspace's tool catalog visible to this session.
    pub fn register_workspace(&self, workspace_id: &str) {
        if let Ok(mut guard) = self.registered_workspaces.lock() {
            if !guard.iter().any(|id| id == workspace_id) {
                guard.push(workspace_id.to_string());
            }
        }
    }

    pub fn unregister_workspace(&self, workspace_id: &str) {
        if let Ok(mut guard) = self.registered_workspaces.lock() {
            guard.retain(|id| id != workspace_id);
        }
    }

    pub fn registered_workspaces(&self) -> Vec<String> {
        self.registered_workspaces
            .lock()
            .map(|g| g.clone())
            .unwrap_or_default()
    }

    /// Aggregated tool set for a turn, deduplicated by id, first seen wins.
    pub async fn aggregate(&self) -> Result<Vec<Arc<dyn Tool>>, ToolError> {
        let mut tools: Vec<Arc<dyn Tool>> = Vec::new();
        let push = |tool: Arc<dyn Tool>, tools: &mut Vec<Arc<dyn Tool>>| {
            if !tools.iter().any(|t| t.id() == tool.id()) {
                tools.push(tool);
            }
        };

        for tool in self.dispatcher.system().tools() {
            push(tool, &mut tools);
        }
        for tool in self.context_session.active() {
            push(tool, &mut tools);
        }

        // Primary + attached workspaces, then every client-owned workspace.
        let mut workspace_ids = self.registered_workspaces();
        for client in self.store.list_clients().await? {
            for ws in self.store.list_workspaces_for_client(&client.id).await? {
                if !workspace_ids.contains(&ws.id) {
                    workspace_ids.push(ws.id);
                }
            }
        }
        for ws_id in workspace_ids {
            let declared = self.store.list_workspace_tools(&ws_id).await?;
            for decl in declared {
                let spec = match decl.schema {
                    Some(schema) => ToolSpec {
                        name: decl.tool_id.clone(),
                        description: decl.description.clone(),
                        input_schema: schema,
                    },
                    // Known tools reuse the system tool's schema when the
                    // dispatcher has one registered under the same id.
                    None => self
                        .dispatcher
                        .system()
                        .get(&decl.tool_id)
                        .map(|t| t.spec())
                        .unwrap_or(ToolSpec {
                            name: decl.tool_id.clone(),
                            description: decl.description.clone(),
                            input_schema: serde_json::json!({"type": "object"}),
                        }),
                };
                push(
                    Arc::new(DelegatingTool::new(
                        spec,
                        self.session_id.clone(),
                        Arc::clone(&self.dispatcher),
                    )),
                    &mut tools,
                );
            }
        }
        Ok(tools)
    }

    /// Specs of the aggregated set, for the LLM request.
    pub async fn aggregate_specs(&self) -> Result<Vec<ToolSpec>, ToolError> {
        Ok(self.aggregate().await?.iter().map(|t| t.spec()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConnectionManager;
    use crate::model::{HostType, Session, WorkspaceRecord, WorkspaceToolRecord};
    use crate::tools::{ToolCallContent, ToolCallContext, ToolRegistry};
    use crate::workspace::WorkspaceStore;
    use async_trait::async_trait;

    struct NamedTool(&'static str);

    #[async_trait]
    impl Tool for NamedTool {
        fn id(&self) -> &str {
            self.0
        }

        fn spec(&self) -> ToolSpec {
            ToolSpec {
                name: self.0.to_string(),
                description: None,
                input_schema: serde_json::json!({"type": "object"}),
            }
        }

        async fn call(
            &self,
            _args: serde_json::Value,
            _ctx: Option<&ToolCallContext>,
        ) -> Result<ToolCallContent, ToolError> {
            Ok(ToolCallContent {
                text: self.0.to_string(),
            })
        }
    }

    async fn manager_with_workspace_tool() -> SessionToolManager {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let connections = Arc::new(ClientConnectionManager::new());
        let workspaces = Arc::new(WorkspaceStore::new(store.clone(), connections.clone()));
        store.save_session(&Session::new("s1", "t")).await.unwrap();

        let mut record = WorkspaceRecord::new("laptop:/p", HostType::Client);
        record.owner_client_id = Some("c1".into());
        store.save_workspace(&record).await.unwrap();
        store
            .save_workspace_tool(&WorkspaceToolRecord {
                id: "wt1".into(),
                workspace_id: record.id.clone(),
                tool_id: "open_editor".into(),
                is_known: false,
                schema: Some(serde_json::json!({"type": "object"})),
                description: Some("Opens the editor".into()),
            })
            .await
            .unwrap();

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(NamedTool("system_tool")));
        let dispatcher = Arc::new(ToolDispatcher::new(
            registry,
            store.clone(),
            workspaces,
            connections,
        ));
        let manager = SessionToolManager::new("s1", store, dispatcher);
        manager.register_workspace(&record.id);
        manager
    }

    /// **Scenario**: Aggregation unions system, context, and workspace tools
    /// with first-seen-wins dedup.
    #[tokio::test(flavor = "multi_thread")]
    async fn aggregation_order_and_dedup() {
        let manager = manager_with_workspace_tool().await;
        manager
            .context_session()
            .set_active(vec![Arc::new(NamedTool("doc_tool")), Arc::new(NamedTool("system_tool"))]);

        let tools = manager.aggregate().await.unwrap();
        let ids: Vec<&str> = tools.iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec!["system_tool", "doc_tool", "open_editor"]);
    }

    /// **Scenario**: Unregistering a workspace removes its tools from the
    /// next aggregation.
    #[tokio::test(flavor = "multi_thread")]
    async fn unregister_removes_workspace_tools() {
        let manager = manager_with_workspace_tool().await;
        let before = manager.aggregate().await.unwrap();
        assert!(before.iter().any(|t| t.id() == "open_editor"));

        let ws_ids = manager.registered_workspaces();
        manager.unregister_workspace(&ws_ids[0]);
        let after = manager.aggregate().await.unwrap();
        assert!(!after.iter().any(|t| t.id() == "open_editor"));
    }
}
