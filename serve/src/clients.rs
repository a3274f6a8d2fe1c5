//! Client identity routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use monad::model::ClientIdentity;

use crate::{ApiError, AppState};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegisterClient {
    id: Option<String>,
    hostname: String,
    display_name: String,
    platform: String,
}

pub(crate) async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterClient>,
) -> Result<(StatusCode, Json<ClientIdentity>), ApiError> {
    let now = chrono::Utc::now();
    let client = ClientIdentity {
        id: body.id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
        hostname: body.hostname,
        display_name: body.display_name,
        platform: body.platform,
        registered_at: now,
        last_seen_at: now,
    };
    state.store.save_client(&client).await?;
    Ok((StatusCode::CREATED, Json(client)))
}

pub(crate) async fn list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ClientIdentity>>, ApiError> {
    Ok(Json(state.store.list_clients().await?))
}

pub(crate) async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_client(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}
