//! Workspace store: loads persisted records and constructs live instances.
//!
//! The factory selects the variant by host type. Startup loads every record
//! and tolerates per-record failures (log and skip) so one broken workspace
//! does not take the server down; those records surface with status
//! `missing`.

use std::sync::Arc;

use dashmap::DashMap;

use crate::client::ClientConnectionManager;
use crate::model::{HostType, WorkspaceRecord, WorkspaceStatus};
use crate::store::Store;

use super::{LocalWorkspace, RemoteWorkspace, Workspace, WorkspaceError};

/// Registry of live workspaces keyed by id.
pub struct WorkspaceStore {
    store: Arc<Store>,
    connections: Arc<ClientConnectionManager>,
    live: DashMap<String, Arc<dyn Workspace>>,
}

impl WorkspaceStore {
    pub fn new(store: Arc<Store>, connections: Arc<ClientConnectionManager>) -> Self {
        Self {
            store,
            connections,
            live: DashMap::new(),
        }
    }

    /// Constructs the variant matching the record's host type.
    fn build(&self, record: WorkspaceRecord) -> Result<Arc<dyn Workspace>, WorkspaceError> {
        match record.host_type {
            HostType::Server | HostType::ServerSession => {
                Ok(Arc::new(LocalWorkspace::new(record)?))
            }
            HostType::Client => Ok(Arc::new(RemoteWorkspace::new(
                record,
                Arc::clone(&self.connections),
            )?)),
        }
    }

    /// Loads all persisted workspaces. Per-record failures are logged and
    /// the record skipped.
    pub async fn load_all(&self) -> Result<usize, WorkspaceError> {
        let records = self
            .store
            .list_workspaces()
            .await
            .map_err(|e| WorkspaceError::Io(e.to_string()))?;
        let mut loaded = 0;
        for record in records {
            let id = record.id.clone();
            match self.build(record) {
                Ok(ws) => {
                    self.live.insert(id, ws);
                    loaded += 1;
                }
                Err(e) => {
                    tracing::warn!(workspace = %id, error = %e, "skipping workspace");
                }
            }
        }
        Ok(loaded)
    }

    /// Live instance by id; loads from the record on a cache miss.
    pub async fn get(&self, id: &str) -> Result<Arc<dyn Workspace>, WorkspaceError> {
        if let Some(ws) = self.live.get(id) {
            return Ok(Arc::clone(ws.value()));
        }
        self.reload(id).await
    }

    /// Rebuilds the live instance from its persisted record.
    pub async fn reload(&self, id: &str) -> Result<Arc<dyn Workspace>, WorkspaceError> {
        let record = self
            .store
            .get_workspace(id)
            .await
            .map_err(|e| WorkspaceError::NotFound(e.to_string()))?;
        let ws = self.build(record)?;
        self.live.insert(id.to_string(), Arc::clone(&ws));
        Ok(ws)
    }

    /// Drops the live instance; the record stays persisted.
    pub fn unload(&self, id: &str) {
        self.live.remove(id);
    }

    /// Persists a new record and constructs its live instance.
    pub async fn create(
        &self,
        record: WorkspaceRecord,
    ) -> Result<Arc<dyn Workspace>, WorkspaceError> {
        let ws = self.build(record.clone())?;
        self.store
            .save_workspace(&record)
            .await
            .map_err(|e| WorkspaceError::Io(e.to_string()))?;
        self.live.insert(record.id.clone(), Arc::clone(&ws));
        Ok(ws)
    }

    /// Current status of a record: server-hosted workspaces whose root is
    /// gone report `missing`.
    pub fn probe_status(record: &WorkspaceRecord) -> WorkspaceStatus {
        match record.host_type {
            HostType::Server | HostType::ServerSession => {
                let exists = record
                    .root_path
                    .as_deref()
                    .map(|p| std::path::Path::new(p).is_dir())
                    .unwrap_or(false);
                if exists {
                    WorkspaceStatus::Active
                } else {
                    WorkspaceStatus::Missing
                }
            }
            HostType::Client => WorkspaceStatus::Active,
        }
    }
}
