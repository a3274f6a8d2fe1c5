//! Session job routes.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use monad::model::Job;

use crate::{ApiError, AppState};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateJob {
    title: String,
    #[serde(default)]
    description: String,
    agent_id: String,
    #[serde(default)]
    priority: i64,
    next_run_at: Option<chrono::DateTime<chrono::Utc>>,
    parent_id: Option<String>,
}

pub(crate) async fn create(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(body): Json<CreateJob>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    state.store.get_session(&session_id).await?;
    let mut job = Job::new(&session_id, body.title, body.description, body.agent_id);
    job.priority = body.priority;
    job.next_run_at = body.next_run_at;
    job.parent_id = body.parent_id;
    state.store.save_job(&job).await?;
    Ok((StatusCode::CREATED, Json(job)))
}

pub(crate) async fn list(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Vec<Job>>, ApiError> {
    state.store.get_session(&session_id).await?;
    Ok(Json(state.store.list_jobs_for_session(&session_id).await?))
}

pub(crate) async fn show(
    State(state): State<Arc<AppState>>,
    Path((session_id, job_id)): Path<(String, String)>,
) -> Result<Json<Job>, ApiError> {
    let job = state.store.get_job(&job_id).await?;
    if job.session_id != session_id {
        return Err(ApiError::not_found(format!("job {}", job_id)));
    }
    Ok(Json(job))
}

/// Cancels the job tree and removes the root row.
pub(crate) async fn remove(
    State(state): State<Arc<AppState>>,
    Path((session_id, job_id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let job = state.store.get_job(&job_id).await?;
    if job.session_id != session_id {
        return Err(ApiError::not_found(format!("job {}", job_id)));
    }
    state.store.cancel_job_tree(&job_id).await?;
    state.store.delete_job(&job_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
