//! Client-hosted workspace: file operations routed to the owning client.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::client::ClientConnectionManager;
use crate::model::WorkspaceRecord;

use super::{Workspace, WorkspaceError, MAX_WRITE_BYTES};

/// Remote workspace; every operation is one RPC to the owning client.
pub struct RemoteWorkspace {
    record: WorkspaceRecord,
    owner: String,
    connections: Arc<ClientConnectionManager>,
}

impl RemoteWorkspace {
    pub fn new(
        record: WorkspaceRecord,
        connections: Arc<ClientConnectionManager>,
    ) -> Result<Self, WorkspaceError> {
        let owner = record.owner_client_id.clone().ok_or_else(|| {
            WorkspaceError::InvalidWorkspaceType(format!(
                "client workspace {} has no owner",
                record.id
            ))
        })?;
        Ok(Self {
            record,
            owner,
            connections,
        })
    }

    async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, WorkspaceError> {
        self.connections
            .send(method, params, &self.owner)
            .await
            .map_err(|e| WorkspaceError::Remote(e.to_string()))
    }
}

#[async_trait]
impl Workspace for RemoteWorkspace {
    fn id(&self) -> &str {
        &self.record.id
    }

    fn record(&self) -> &WorkspaceRecord {
        &self.record
    }

    async fn read_file(&self, path: &str) -> Result<String, WorkspaceError> {
        let result = self
            .call(
                "workspace/readFile",
                json!({"workspaceId": self.record.id, "path": path}),
            )
            .await?;
        result
            .get("text")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| WorkspaceError::Remote("malformed readFile result".to_string()))
    }

    async fn write_file(&self, path: &str, content: &str) -> Result<(), WorkspaceError> {
        if content.len() > MAX_WRITE_BYTES {
            return Err(WorkspaceError::TooLarge);
        }
        self.call(
            "workspace/writeFile",
            json!({"workspaceId": self.record.id, "path": path, "content": content}),
        )
        .await?;
        Ok(())
    }

    async fn list_files(&self) -> Result<Vec<String>, WorkspaceError> {
        let result = self
            .call("workspace/listFiles", json!({"workspaceId": self.record.id}))
            .await?;
        let files = result
            .get("files")
            .and_then(|v| v.as_array())
            .ok_or_else(|| WorkspaceError::Remote("malformed listFiles result".to_string()))?;
        Ok(files
            .iter()
            .filter_map(|v| v.as_str().map(String::from))
            .collect())
    }

    async fn delete_file(&self, path: &str) -> Result<(), WorkspaceError> {
        self.call(
            "workspace/deleteFile",
            json!({"workspaceId": self.record.id, "path": path}),
        )
        .await?;
        Ok(())
    }
}
