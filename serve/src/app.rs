//! Axum app: shared state and the router.

use std::sync::Arc;
use std::time::Instant;

use axum::routing::{delete, get, post};
use axum::Router;

use monad::client::ClientConnectionManager;
use monad::context::Embedder;
use monad::engine::ChatEngine;
use monad::session::SessionManager;
use monad::store::Store;
use monad::workspace::WorkspaceStore;

/// Shared handles into the core.
pub struct AppState {
    pub store: Arc<Store>,
    pub sessions: Arc<SessionManager>,
    pub engine: Arc<ChatEngine>,
    pub workspaces: Arc<WorkspaceStore>,
    pub connections: Arc<ClientConnectionManager>,
    pub embedder: Arc<dyn Embedder>,
    /// Health reported for the LLM provider ("ok" / "degraded" / "down").
    pub provider_status: &'static str,
    pub started_at: Instant,
}

/// Builds the full router over the shared state.
pub fn build_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route(
            "/sessions",
            post(crate::sessions::create).get(crate::sessions::list),
        )
        .route(
            "/sessions/:id",
            get(crate::sessions::show)
                .patch(crate::sessions::update)
                .delete(crate::sessions::remove),
        )
        .route("/sessions/:id/chat", post(crate::chat::chat))
        .route("/sessions/:id/chat/stream", post(crate::chat::chat_stream))
        .route("/sessions/:id/messages", get(crate::sessions::messages))
        .route(
            "/sessions/:id/workspaces",
            post(crate::sessions::attach_workspace).get(crate::sessions::list_workspaces),
        )
        .route(
            "/sessions/:id/workspaces/:ws_id",
            delete(crate::sessions::detach_workspace),
        )
        .route(
            "/sessions/:id/jobs",
            post(crate::jobs::create).get(crate::jobs::list),
        )
        .route(
            "/sessions/:id/jobs/:job_id",
            get(crate::jobs::show).delete(crate::jobs::remove),
        )
        .route(
            "/memories",
            post(crate::memories::create).get(crate::memories::list),
        )
        .route("/memories/search", post(crate::memories::search))
        .route(
            "/memories/:id",
            get(crate::memories::show).delete(crate::memories::remove),
        )
        .route("/clients/register", post(crate::clients::register))
        .route("/clients", get(crate::clients::list))
        .route("/clients/:id", delete(crate::clients::remove))
        .route(
            "/workspaces",
            post(crate::workspaces::create).get(crate::workspaces::list),
        )
        .route(
            "/workspaces/:id",
            get(crate::workspaces::show)
                .patch(crate::workspaces::update)
                .delete(crate::workspaces::remove),
        )
        .route(
            "/workspaces/:id/tools",
            post(crate::workspaces::add_tool).get(crate::workspaces::list_tools),
        )
        .route("/workspaces/:id/files", get(crate::workspaces::list_files))
        .route(
            "/workspaces/:id/files/*path",
            get(crate::workspaces::read_file)
                .put(crate::workspaces::write_file)
                .delete(crate::workspaces::delete_file),
        )
        .route("/status", get(crate::status::status))
        .route("/v1/connect", get(crate::connection::connect))
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use monad::llm::MockLlm;

    /// State over an in-memory store, a temp sessions root, and mock models.
    pub(crate) fn test_state(root: &std::path::Path) -> Arc<AppState> {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let connections = Arc::new(ClientConnectionManager::new());
        let workspaces = Arc::new(WorkspaceStore::new(store.clone(), connections.clone()));
        let embedder = Arc::new(monad::context::MockEmbedder::new(16));
        let sessions = Arc::new(SessionManager::new(
            store.clone(),
            workspaces.clone(),
            connections.clone(),
            embedder.clone(),
            None,
            root.to_path_buf(),
        ));
        let engine = Arc::new(ChatEngine::new(
            sessions.clone(),
            Arc::new(MockLlm::with_no_tool_calls("hello from the mock")),
            Arc::new(MockLlm::with_no_tool_calls("summary")),
        ));
        Arc::new(AppState {
            store,
            sessions,
            engine,
            workspaces,
            connections,
            embedder,
            provider_status: "ok",
            started_at: Instant::now(),
        })
    }

    /// **Scenario**: The router builds over a fully-wired state.
    #[tokio::test(flavor = "multi_thread")]
    async fn router_builds() {
        let root = tempfile::tempdir().unwrap();
        let _router = build_app(test_state(root.path()));
    }
}
