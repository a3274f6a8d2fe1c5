//! Session manager: lifecycle and the per-session component graph.
//!
//! The manager is the single writer of the in-memory session map. Each live
//! session owns a context manager, a tool manager, a tool dispatcher, and
//! the last debug snapshot; everything durable goes through the store.

mod components;
mod tool_manager;

pub use components::{DebugSnapshot, SessionComponents, ToolCallTrace};
pub use tool_manager::{SessionToolManager, ToolContextSession};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::client::ClientConnectionManager;
use crate::context::{ContextManager, Embedder, TagGenerator};
use crate::model::{HostType, Session, TrustLevel, WorkspaceRecord, WorkspaceStatus};
use crate::store::{Store, StoreError};
use crate::tools::{
    bind_known_tool, ExecuteSqlTool, QueueJobTool, SpawnSubagentTool, ToolDispatcher,
    ToolRegistry, TOOL_DELETE_FILE, TOOL_LIST_FILES, TOOL_READ_FILE, TOOL_WRITE_FILE,
};
use crate::workspace::{
    LocalWorkspace, Workspace, WorkspaceError, WorkspaceStore, WorkspaceUri,
};

/// Default persona written into a fresh session's `Persona.md`.
const DEFAULT_PERSONA: &str = "You are a helpful, direct assistant.";
/// Agent id used when a queued job names none.
const DEFAULT_AGENT_ID: &str = "assistant";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session not found: {0}")]
    NotFound(String),
    #[error("persistence: {0}")]
    Persistence(String),
    #[error("workspace: {0}")]
    Workspace(#[from] WorkspaceError),
    #[error("io: {0}")]
    Io(String),
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => SessionError::NotFound(what),
            other => SessionError::Persistence(other.to_string()),
        }
    }
}

/// Cloned handles into a live session's component graph.
#[derive(Clone)]
pub struct SessionHandles {
    pub context: Arc<ContextManager>,
    pub tools: Arc<SessionToolManager>,
    pub dispatcher: Arc<ToolDispatcher>,
}

/// Owns session rows and the per-session component graphs.
pub struct SessionManager {
    store: Arc<Store>,
    workspaces: Arc<WorkspaceStore>,
    connections: Arc<ClientConnectionManager>,
    embedder: Arc<dyn Embedder>,
    tag_generator: Option<Arc<dyn TagGenerator>>,
    sessions_root: PathBuf,
    live: Mutex<HashMap<String, SessionComponents>>,
}

impl SessionManager {
    pub fn new(
        store: Arc<Store>,
        workspaces: Arc<WorkspaceStore>,
        connections: Arc<ClientConnectionManager>,
        embedder: Arc<dyn Embedder>,
        tag_generator: Option<Arc<dyn TagGenerator>>,
        sessions_root: PathBuf,
    ) -> Self {
        Self {
            store,
            workspaces,
            connections,
            embedder,
            tag_generator,
            sessions_root,
            live: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn workspace_store(&self) -> &Arc<WorkspaceStore> {
        &self.workspaces
    }

    fn working_dir(&self, session_id: &str) -> PathBuf {
        self.sessions_root.join(session_id)
    }

    /// Builds the component graph for a session rooted at `working_dir`.
    fn build_components(
        &self,
        session_id: &str,
        working_dir: PathBuf,
        parent_job_id: Option<String>,
    ) -> SessionComponents {
        let mut system = ToolRegistry::new();
        system.register(Arc::new(ExecuteSqlTool::new(Arc::clone(&self.store))));
        system.register(Arc::new(QueueJobTool::new(
            Arc::clone(&self.store),
            DEFAULT_AGENT_ID,
        )));
        system.register(Arc::new(SpawnSubagentTool::new(Arc::clone(&self.store))));

        // File tools jailed to the session's own working directory.
        let mut fs_record = WorkspaceRecord::new(
            format!("monad-session-{}", session_id),
            HostType::ServerSession,
        );
        fs_record.root_path = Some(working_dir.display().to_string());
        fs_record.trust = TrustLevel::Full;
        match LocalWorkspace::new(fs_record) {
            Ok(local) => {
                let jailed: Arc<dyn Workspace> = Arc::new(local);
                for tool_id in [
                    TOOL_READ_FILE,
                    TOOL_WRITE_FILE,
                    TOOL_LIST_FILES,
                    TOOL_DELETE_FILE,
                ] {
                    if let Some(tool) = bind_known_tool(tool_id, Arc::clone(&jailed)) {
                        system.register(tool);
                    }
                }
            }
            Err(e) => {
                tracing::warn!(session = %session_id, error = %e, "no working dir; file tools disabled");
            }
        }

        let dispatcher = Arc::new(ToolDispatcher::new(
            system,
            Arc::clone(&self.store),
            Arc::clone(&self.workspaces),
            Arc::clone(&self.connections),
        ));
        let tools = Arc::new(SessionToolManager::new(
            session_id,
            Arc::clone(&self.store),
            Arc::clone(&dispatcher),
        ));
        let context = Arc::new(ContextManager::new(
            Arc::clone(&self.store),
            Arc::clone(&self.embedder),
            self.tag_generator.clone(),
            working_dir,
        ));
        SessionComponents {
            context,
            tools,
            dispatcher,
            snapshot: None,
            last_access: std::time::Instant::now(),
            parent_job_id,
        }
    }

    /// Creates a session: working directory with seeded notes, a
    /// session-scoped workspace, the session row, and the component graph.
    /// Any failure rolls back in-memory state and removes the directory.
    pub async fn create_session(
        &self,
        title: &str,
        persona: Option<&str>,
    ) -> Result<Session, SessionError> {
        let id = uuid::Uuid::new_v4().to_string();
        let dir = self.working_dir(&id);

        let result = self.create_session_inner(&id, &dir, title, persona).await;
        if result.is_err() {
            self.live.lock().await.remove(&id);
            if dir.exists() {
                if let Err(e) = std::fs::remove_dir_all(&dir) {
                    tracing::warn!(session = %id, error = %e, "rollback cleanup failed");
                }
            }
        }
        result
    }

    async fn create_session_inner(
        &self,
        id: &str,
        dir: &std::path::Path,
        title: &str,
        persona: Option<&str>,
    ) -> Result<Session, SessionError> {
        let notes_dir = dir.join("Notes");
        std::fs::create_dir_all(&notes_dir).map_err(|e| SessionError::Io(e.to_string()))?;
        std::fs::write(
            notes_dir.join("Persona.md"),
            persona.unwrap_or(DEFAULT_PERSONA),
        )
        .map_err(|e| SessionError::Io(e.to_string()))?;
        std::fs::write(
            notes_dir.join("Scratchpad.md"),
            "# Scratchpad\n\nWorking notes for this session.\n",
        )
        .map_err(|e| SessionError::Io(e.to_string()))?;

        let uri = WorkspaceUri::new(format!("monad-session-{}", id), dir.display().to_string());
        let mut record = WorkspaceRecord::new(uri.format(), HostType::ServerSession);
        record.root_path = Some(dir.display().to_string());
        record.trust = TrustLevel::Full;
        let workspace = self.workspaces.create(record).await?;

        let mut session = Session::new(id, title);
        session.working_dir = Some(dir.display().to_string());
        session.primary_workspace_id = Some(workspace.id().to_string());
        session.persona = persona.map(String::from);
        self.store.save_session(&session).await?;

        let components = self.build_components(id, dir.to_path_buf(), None);
        components.tools.register_workspace(workspace.id());
        self.live.lock().await.insert(id.to_string(), components);

        tracing::info!(session = %id, "session created");
        Ok(session)
    }

    /// Loads a persisted session into memory. A no-op when already live.
    pub async fn hydrate_session(
        &self,
        session_id: &str,
        parent_job_id: Option<&str>,
    ) -> Result<(), SessionError> {
        {
            let live = self.live.lock().await;
            if live.contains_key(session_id) {
                return Ok(());
            }
        }
        let session = self.store.get_session(session_id).await?;
        let working_dir = session
            .working_dir
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.working_dir(session_id));

        let components = self.build_components(
            session_id,
            working_dir,
            parent_job_id.map(String::from),
        );
        for ws_id in session.workspace_ids() {
            match self.store.get_workspace(&ws_id).await {
                Ok(record) => {
                    if WorkspaceStore::probe_status(&record) == WorkspaceStatus::Missing {
                        tracing::warn!(workspace = %ws_id, "workspace root missing");
                        continue;
                    }
                    if let Err(e) = self.workspaces.reload(&ws_id).await {
                        tracing::warn!(workspace = %ws_id, error = %e, "workspace load failed");
                        continue;
                    }
                    components.tools.register_workspace(&ws_id);
                }
                Err(e) => {
                    tracing::warn!(workspace = %ws_id, error = %e, "workspace record missing");
                }
            }
        }
        self.live
            .lock()
            .await
            .insert(session_id.to_string(), components);
        Ok(())
    }

    /// Handles into a live session, hydrating on demand.
    pub async fn handles(&self, session_id: &str) -> Result<SessionHandles, SessionError> {
        self.hydrate_session(session_id, None).await?;
        let mut live = self.live.lock().await;
        let components = live
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        components.touch();
        Ok(SessionHandles {
            context: Arc::clone(&components.context),
            tools: Arc::clone(&components.tools),
            dispatcher: Arc::clone(&components.dispatcher),
        })
    }

    pub async fn update_session_title(
        &self,
        session_id: &str,
        title: &str,
    ) -> Result<Session, SessionError> {
        let mut session = self.store.get_session(session_id).await?;
        session.title = title.to_string();
        session.updated_at = chrono::Utc::now();
        self.store.save_session(&session).await?;
        Ok(session)
    }

    /// Persona updates go to `Notes/Persona.md` and the session row; the
    /// in-memory graph needs no refresh (notes are read per turn).
    pub async fn update_session_persona(
        &self,
        session_id: &str,
        persona: &str,
    ) -> Result<Session, SessionError> {
        let mut session = self.store.get_session(session_id).await?;
        if let Some(dir) = session.working_dir.as_deref() {
            let notes_dir = std::path::Path::new(dir).join("Notes");
            std::fs::create_dir_all(&notes_dir).map_err(|e| SessionError::Io(e.to_string()))?;
            std::fs::write(notes_dir.join("Persona.md"), persona)
                .map_err(|e| SessionError::Io(e.to_string()))?;
        }
        session.persona = Some(persona.to_string());
        session.updated_at = chrono::Utc::now();
        self.store.save_session(&session).await?;
        Ok(session)
    }

    /// Binds a workspace to the session as primary or attached, and exposes
    /// its tools to the per-session tool manager.
    pub async fn attach_workspace(
        &self,
        workspace_id: &str,
        session_id: &str,
        is_primary: bool,
    ) -> Result<(), SessionError> {
        // Validate the workspace exists before touching the session row.
        self.store.get_workspace(workspace_id).await?;
        let mut session = self.store.get_session(session_id).await?;
        if is_primary {
            session.primary_workspace_id = Some(workspace_id.to_string());
            session
                .attached_workspace_ids
                .retain(|id| id != workspace_id);
        } else if session.primary_workspace_id.as_deref() != Some(workspace_id)
            && !session
                .attached_workspace_ids
                .iter()
                .any(|id| id == workspace_id)
        {
            session.attached_workspace_ids.push(workspace_id.to_string());
        }
        session.updated_at = chrono::Utc::now();
        self.store.save_session(&session).await?;

        if let Some(components) = self.live.lock().await.get(session_id) {
            components.tools.register_workspace(workspace_id);
        }
        Ok(())
    }

    pub async fn detach_workspace(
        &self,
        workspace_id: &str,
        session_id: &str,
    ) -> Result<(), SessionError> {
        let mut session = self.store.get_session(session_id).await?;
        if session.primary_workspace_id.as_deref() == Some(workspace_id) {
            session.primary_workspace_id = None;
        }
        session
            .attached_workspace_ids
            .retain(|id| id != workspace_id);
        session.updated_at = chrono::Utc::now();
        self.store.save_session(&session).await?;

        if let Some(components) = self.live.lock().await.get(session_id) {
            components.tools.unregister_workspace(workspace_id);
        }
        Ok(())
    }

    /// Workspace records bound to a session, with server-hosted roots probed
    /// so vanished directories report `missing`.
    pub async fn get_workspaces(
        &self,
        session_id: &str,
    ) -> Result<Vec<WorkspaceRecord>, SessionError> {
        let session = self.store.get_session(session_id).await?;
        let mut records = Vec::new();
        for ws_id in session.workspace_ids() {
            match self.store.get_workspace(&ws_id).await {
                Ok(mut record) => {
                    record.status = WorkspaceStore::probe_status(&record);
                    records.push(record);
                }
                Err(e) => tracing::warn!(workspace = %ws_id, error = %e, "dangling workspace ref"),
            }
        }
        Ok(records)
    }

    /// Evicts idle in-memory sessions. Persistence is untouched. Returns the
    /// number evicted.
    pub async fn cleanup_stale_sessions(&self, max_age: Duration) -> usize {
        let mut live = self.live.lock().await;
        let before = live.len();
        live.retain(|_, components| components.last_access.elapsed() <= max_age);
        before - live.len()
    }

    pub async fn set_debug_snapshot(&self, session_id: &str, snapshot: DebugSnapshot) {
        if let Some(components) = self.live.lock().await.get_mut(session_id) {
            components.snapshot = Some(snapshot);
        }
    }

    pub async fn get_debug_snapshot(&self, session_id: &str) -> Option<DebugSnapshot> {
        self.live
            .lock()
            .await
            .get(session_id)
            .and_then(|c| c.snapshot.clone())
    }

    /// True when the session is currently hydrated.
    pub async fn is_live(&self, session_id: &str) -> bool {
        self.live.lock().await.contains_key(session_id)
    }
}
