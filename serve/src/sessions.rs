//! Session routes: CRUD, messages, workspace bindings.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use monad::model::Session;

use crate::{ApiError, AppState};

/// Parses `page`/`perPage` query params into (offset, limit). Pages are
/// 1-based; defaults are page 1, 50 per page.
pub(crate) fn pagination(params: &HashMap<String, String>) -> (usize, usize) {
    let page: usize = params
        .get("page")
        .and_then(|p| p.parse().ok())
        .filter(|&p| p > 0)
        .unwrap_or(1);
    let per_page: usize = params
        .get("perPage")
        .and_then(|p| p.parse().ok())
        .filter(|&p| p > 0)
        .unwrap_or(50)
        .min(200);
    ((page - 1) * per_page, per_page)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateSession {
    title: String,
    persona: Option<String>,
}

pub(crate) async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateSession>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let session = state
        .sessions
        .create_session(&body.title, body.persona.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(session)))
}

pub(crate) async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<Session>>, ApiError> {
    let (offset, limit) = pagination(&params);
    Ok(Json(state.store.list_sessions(offset, limit).await?))
}

pub(crate) async fn show(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    Ok(Json(state.store.get_session(&id).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UpdateSession {
    title: Option<String>,
    persona: Option<String>,
    archive: Option<bool>,
}

pub(crate) async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateSession>,
) -> Result<Json<Session>, ApiError> {
    if let Some(title) = body.title.as_deref() {
        state.sessions.update_session_title(&id, title).await?;
    }
    if let Some(persona) = body.persona.as_deref() {
        state.sessions.update_session_persona(&id, persona).await?;
    }
    if body.archive == Some(true) {
        state.store.archive_session(&id).await?;
    }
    Ok(Json(state.store.get_session(&id).await?))
}

pub(crate) async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_session(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn messages(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<monad::model::ChatMessage>>, ApiError> {
    state.store.get_session(&id).await?;
    let (offset, limit) = pagination(&params);
    Ok(Json(
        state.store.list_messages_page(&id, offset, limit).await?,
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AttachWorkspace {
    workspace_id: String,
    #[serde(default)]
    is_primary: bool,
}

pub(crate) async fn attach_workspace(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<AttachWorkspace>,
) -> Result<StatusCode, ApiError> {
    state
        .sessions
        .attach_workspace(&body.workspace_id, &id, body.is_primary)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn detach_workspace(
    State(state): State<Arc<AppState>>,
    Path((id, ws_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    state.sessions.detach_workspace(&ws_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub(crate) async fn list_workspaces(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<monad::model::WorkspaceRecord>>, ApiError> {
    Ok(Json(state.sessions.get_workspaces(&id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::test_state;

    /// **Scenario**: page/perPage map to offset/limit with sane defaults.
    #[test]
    fn pagination_defaults_and_pages() {
        let mut params = HashMap::new();
        assert_eq!(pagination(&params), (0, 50));
        params.insert("page".into(), "3".into());
        params.insert("perPage".into(), "20".into());
        assert_eq!(pagination(&params), (40, 20));
        params.insert("perPage".into(), "100000".into());
        assert_eq!(pagination(&params).1, 200);
        params.insert("page".into(), "0".into());
        assert_eq!(pagination(&params).0, 0);
    }

    /// **Scenario**: Create, fetch, update, and delete a session through the
    /// handlers.
    #[tokio::test(flavor = "multi_thread")]
    async fn session_crud_flow() {
        let root = tempfile::tempdir().unwrap();
        let state = test_state(root.path());

        let (status, Json(session)) = create(
            State(state.clone()),
            Json(CreateSession {
                title: "via api".into(),
                persona: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let Json(loaded) = show(State(state.clone()), Path(session.id.clone()))
            .await
            .unwrap();
        assert_eq!(loaded.title, "via api");

        let Json(renamed) = update(
            State(state.clone()),
            Path(session.id.clone()),
            Json(UpdateSession {
                title: Some("renamed".into()),
                persona: None,
                archive: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(renamed.title, "renamed");

        let status = remove(State(state.clone()), Path(session.id.clone()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let err = show(State(state), Path(session.id)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::NOT_FOUND);
    }

    /// **Scenario**: Deleting an archived session maps to a conflict.
    #[tokio::test(flavor = "multi_thread")]
    async fn archived_delete_conflicts() {
        let root = tempfile::tempdir().unwrap();
        let state = test_state(root.path());
        let (_, Json(session)) = create(
            State(state.clone()),
            Json(CreateSession {
                title: "to archive".into(),
                persona: None,
            }),
        )
        .await
        .unwrap();

        update(
            State(state.clone()),
            Path(session.id.clone()),
            Json(UpdateSession {
                title: None,
                persona: None,
                archive: Some(true),
            }),
        )
        .await
        .unwrap();

        let err = remove(State(state), Path(session.id)).await.unwrap_err();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }
}
