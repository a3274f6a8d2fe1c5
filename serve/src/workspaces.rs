//! Workspace routes: CRUD, tool catalog, jailed file access.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use monad::model::{HostType, TrustLevel, WorkspaceRecord, WorkspaceToolRecord};
use monad::workspace::{HostKind, WorkspaceUri, MAX_WRITE_BYTES};

use crate::{ApiError, AppState};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateWorkspace {
    uri: String,
    owner_client_id: Option<String>,
    root_path: Option<String>,
    trust: Option<String>,
}

pub(crate) async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateWorkspace>,
) -> Result<(StatusCode, Json<WorkspaceRecord>), ApiError> {
    let uri = WorkspaceUri::parse(&body.uri)?;
    let host_type = match uri.host_kind() {
        HostKind::Server => HostType::Server,
        // Repositories are server-hosted checkouts.
        HostKind::Repo => HostType::Server,
        HostKind::Client => HostType::Client,
    };
    let mut record = WorkspaceRecord::new(uri.format(), host_type);
    record.owner_client_id = body.owner_client_id;
    record.root_path = body.root_path.or_else(|| match host_type {
        HostType::Server | HostType::ServerSession => Some(uri.path.clone()),
        HostType::Client => None,
    });
    if let Some(trust) = body.trust.as_deref() {
        record.trust = trust
            .parse::<TrustLevel>()
            .map_err(ApiError::bad_request)?;
    }
    let workspace = state.workspaces.create(record).await?;
    let stored = state.store.get_workspace(workspace.id()).await?;
    Ok((StatusCode::CREATED, Json(stored)))
}

pub(crate) async fn list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<WorkspaceRecord>>, ApiError> {
    Ok(Json(state.store.list_workspaces().await?))
}

pub(crate) async fn show(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<WorkspaceRecord>, ApiError> {
    Ok(Json(state.store.get_workspace(&id).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateWorkspace {
    trust: Option<String>,
}

pub(crate) async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateWorkspace>,
) -> Result<Json<WorkspaceRecord>, ApiError> {
    let mut record = state.store.get_workspace(&id).await?;
    if let Some(trust) = body.trust.as_deref() {
        record.trust = trust
            .parse::<TrustLevel>()
            .map_err(ApiError::bad_request)?;
    }
    state.store.save_workspace(&record).await?;
    state.workspaces.reload(&id).await?;
    Ok(Json(record))
}

pub(crate) async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.workspaces.unload(&id);
    state.store.delete_workspace(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AddTool {
    tool_id: String,
    #[serde(default)]
    is_known: bool,
    schema: Option<serde_json::Value>,
    description: Option<String>,
}

pub(crate) async fn add_tool(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<AddTool>,
) -> Result<(StatusCode, Json<WorkspaceToolRecord>), ApiError> {
    state.store.get_workspace(&id).await?;
    if !body.is_known && body.schema.is_none() {
        return Err(ApiError::bad_request(
            "custom workspace tools need an inline schema",
        ));
    }
    let tool = WorkspaceToolRecord {
        id: uuid::Uuid::new_v4().to_string(),
        workspace_id: id,
        tool_id: body.tool_id,
        is_known: body.is_known,
        schema: body.schema,
        description: body.description,
    };
    state.store.save_workspace_tool(&tool).await?;
    Ok((StatusCode::CREATED, Json(tool)))
}

pub(crate) async fn list_tools(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<WorkspaceToolRecord>>, ApiError> {
    state.store.get_workspace(&id).await?;
    Ok(Json(state.store.list_workspace_tools(&id).await?))
}

pub(crate) async fn list_files(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<String>>, ApiError> {
    let workspace = state.workspaces.get(&id).await?;
    Ok(Json(workspace.list_files().await?))
}

pub(crate) async fn read_file(
    State(state): State<Arc<AppState>>,
    Path((id, path)): Path<(String, String)>,
) -> Result<String, ApiError> {
    let workspace = state.workspaces.get(&id).await?;
    Ok(workspace.read_file(&path).await?)
}

pub(crate) async fn write_file(
    State(state): State<Arc<AppState>>,
    Path((id, path)): Path<(String, String)>,
    body: String,
) -> Result<StatusCode, ApiError> {
    if body.len() > MAX_WRITE_BYTES {
        return Err(ApiError::new(
            StatusCode::PAYLOAD_TOO_LARGE,
            format!("write exceeds {} bytes", MAX_WRITE_BYTES),
        ));
    }
    let workspace = state.workspaces.get(&id).await?;
    workspace.write_file(&path, &body).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn delete_file(
    State(state): State<Arc<AppState>>,
    Path((id, path)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let workspace = state.workspaces.get(&id).await?;
    workspace.delete_file(&path).await?;
    Ok(StatusCode::NO_CONTENT)
}
