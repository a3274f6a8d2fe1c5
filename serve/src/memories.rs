//! Memory routes: CRUD and semantic search.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use monad::model::Memory;
use monad::store::SimilarityPolicy;

use crate::{ApiError, AppState};

/// Near-duplicate threshold applied to memory writes.
const PREVENT_SIMILAR_THRESHOLD: f32 = 0.95;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreateMemory {
    title: String,
    content: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CreatedMemory {
    id: String,
    deduplicated: bool,
}

pub(crate) async fn create(
    State(state): State<Arc<AppState>>,
    Json(body): Json<CreateMemory>,
) -> Result<(StatusCode, Json<CreatedMemory>), ApiError> {
    let mut memory = Memory::new(body.title, body.content, body.tags);
    let text = format!("{}\n{}", memory.title, memory.content);
    memory.embedding = state
        .embedder
        .embed(&[&text])
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?
        .into_iter()
        .next()
        .unwrap_or_default();

    let id = state
        .store
        .save_memory(
            &memory,
            SimilarityPolicy::PreventSimilar(PREVENT_SIMILAR_THRESHOLD),
        )
        .await?;
    let deduplicated = id != memory.id;
    Ok((StatusCode::CREATED, Json(CreatedMemory { id, deduplicated })))
}

pub(crate) async fn list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Memory>>, ApiError> {
    Ok(Json(state.store.list_memories().await?))
}

pub(crate) async fn show(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Memory>, ApiError> {
    Ok(Json(state.store.get_memory(&id).await?))
}

pub(crate) async fn remove(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_memory(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SearchMemories {
    query: String,
    limit: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MemoryHit {
    memory: Memory,
    score: f32,
}

pub(crate) async fn search(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SearchMemories>,
) -> Result<Json<Vec<MemoryHit>>, ApiError> {
    let vectors = state
        .embedder
        .embed(&[&body.query])
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;
    let query = vectors.into_iter().next().unwrap_or_default();

    let hits = state
        .store
        .search_memories(&query, body.limit.unwrap_or(10), 0.0)
        .await?;
    Ok(Json(
        hits.into_iter()
            .map(|h| MemoryHit {
                memory: h.memory,
                score: h.score,
            })
            .collect(),
    ))
}
