//! Memory CRUD plus similarity and tag search.
//!
//! Similarity is brute-force cosine over every row with a non-empty
//! embedding; there is no vector index. Tag search prefilters with SQL LIKE
//! and then applies a precise lowercased token-set intersection.

use rusqlite::params;

use crate::model::{normalize_tags, Memory};

use super::{from_json_text, map_sql_err, to_json_text, ts_from_sql, Store, StoreError};

/// Write policy for [`Store::save_memory`].
#[derive(Clone, Copy, Debug)]
pub enum SimilarityPolicy {
    /// Always write.
    Allow,
    /// Fail open: when an existing memory's cosine similarity to the incoming
    /// embedding exceeds the threshold, return that memory's id instead of
    /// writing.
    PreventSimilar(f32),
}

/// One similarity search hit.
#[derive(Clone, Debug)]
pub struct MemoryMatch {
    pub memory: Memory,
    pub score: f32,
}

/// Cosine similarity; zero when either vector has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

const MEMORY_COLUMNS: &str = "id, title, content, tags, created_at, updated_at, embedding";

fn row_to_memory(row: &rusqlite::Row<'_>) -> rusqlite::Result<Memory> {
    let tags: String = row.get(3)?;
    let created: String = row.get(4)?;
    let updated: String = row.get(5)?;
    let embedding: String = row.get(6)?;
    Ok(Memory {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        tags: from_json_text(&tags),
        created_at: ts_from_sql(4, created)?,
        updated_at: ts_from_sql(5, updated)?,
        embedding: from_json_text(&embedding),
    })
}

impl Store {
    /// Saves a memory under the given similarity policy.
    ///
    /// Returns the id the caller should use from now on: the memory's own id
    /// after a write, or the id of an existing near-duplicate when the policy
    /// prevented the write.
    pub async fn save_memory(
        &self,
        memory: &Memory,
        policy: SimilarityPolicy,
    ) -> Result<String, StoreError> {
        if let SimilarityPolicy::PreventSimilar(threshold) = policy {
            if !memory.embedding.is_empty() {
                let hits = self
                    .search_memories(&memory.embedding, 1, threshold)
                    .await?;
                if let Some(hit) = hits.first() {
                    if hit.memory.id != memory.id {
                        tracing::debug!(
                            existing = %hit.memory.id,
                            score = hit.score,
                            "near-duplicate memory; returning existing id"
                        );
                        return Ok(hit.memory.id.clone());
                    }
                }
            }
        }
        self.upsert_memory(memory).await?;
        Ok(memory.id.clone())
    }

    async fn upsert_memory(&self, memory: &Memory) -> Result<(), StoreError> {
        let tags = to_json_text(&memory.tags)?;
        let embedding = to_json_text(&memory.embedding)?;
        let memory = memory.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO memory (id, title, content, tags, created_at, updated_at, embedding) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                 ON CONFLICT(id) DO UPDATE SET \
                     title = excluded.title, \
                     content = excluded.content, \
                     tags = excluded.tags, \
                     updated_at = excluded.updated_at, \
                     embedding = excluded.embedding",
                params![
                    memory.id,
                    memory.title,
                    memory.content,
                    tags,
                    memory.created_at.to_rfc3339(),
                    memory.updated_at.to_rfc3339(),
                    embedding,
                ],
            )
            .map_err(map_sql_err)?;
            Ok(())
        })
    }

    pub async fn get_memory(&self, id: &str) -> Result<Memory, StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let sql = format!("SELECT {} FROM memory WHERE id = ?1", MEMORY_COLUMNS);
            conn.query_row(&sql, params![id], row_to_memory)
                .map_err(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => {
                        StoreError::NotFound(format!("memory {}", id))
                    }
                    other => map_sql_err(other),
                })
        })
    }

    pub async fn list_memories(&self) -> Result<Vec<Memory>, StoreError> {
        self.with_conn(move |conn| {
            let sql = format!("SELECT {} FROM memory ORDER BY created_at, id", MEMORY_COLUMNS);
            let mut stmt = conn.prepare(&sql).map_err(map_sql_err)?;
            let rows = stmt.query_map([], row_to_memory).map_err(map_sql_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_err)
        })
    }

    pub async fn delete_memory(&self, id: &str) -> Result<(), StoreError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let affected = conn
                .execute("DELETE FROM memory WHERE id = ?1", params![id])
                .map_err(map_sql_err)?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("memory {}", id)));
            }
            Ok(())
        })
    }

    /// Replaces a memory's embedding (reinforcement updates come through
    /// here; the context pipeline holds copies only).
    pub async fn update_memory_embedding(
        &self,
        id: &str,
        embedding: &[f32],
    ) -> Result<(), StoreError> {
        let id = id.to_string();
        let embedding = to_json_text(&embedding.to_vec())?;
        self.with_conn(move |conn| {
            let affected = conn
                .execute(
                    "UPDATE memory SET embedding = ?2, updated_at = ?3 WHERE id = ?1",
                    params![id, embedding, chrono::Utc::now().to_rfc3339()],
                )
                .map_err(map_sql_err)?;
            if affected == 0 {
                return Err(StoreError::NotFound(format!("memory {}", id)));
            }
            Ok(())
        })
    }

    /// Brute-force cosine search over all embedded memories. Returns up to
    /// `limit` hits with score >= `min_similarity`, best first.
    pub async fn search_memories(
        &self,
        query: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Result<Vec<MemoryMatch>, StoreError> {
        let query = query.to_vec();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT {} FROM memory WHERE embedding != '[]' AND embedding != ''",
                MEMORY_COLUMNS
            );
            let mut stmt = conn.prepare(&sql).map_err(map_sql_err)?;
            let rows = stmt.query_map([], row_to_memory).map_err(map_sql_err)?;
            let mut hits: Vec<MemoryMatch> = Vec::new();
            for row in rows {
                let memory = row.map_err(map_sql_err)?;
                let score = cosine_similarity(&query, &memory.embedding);
                if score >= min_similarity {
                    hits.push(MemoryMatch { memory, score });
                }
            }
            hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
            hits.truncate(limit);
            Ok(hits)
        })
    }

    /// Tag search: SQL LIKE prefilter on the stored tag text, then a precise
    /// case-insensitive token-set intersection.
    pub async fn search_memories_by_tags(
        &self,
        tags: &[String],
    ) -> Result<Vec<Memory>, StoreError> {
        let wanted = normalize_tags(tags.to_vec());
        if wanted.is_empty() {
            return Ok(Vec::new());
        }
        let like_terms = wanted.clone();
        let candidates = self.with_conn(move |conn| {
            let clauses: Vec<String> = (0..like_terms.len())
                .map(|i| format!("tags LIKE ?{}", i + 1))
                .collect();
            let sql = format!(
                "SELECT {} FROM memory WHERE {}",
                MEMORY_COLUMNS,
                clauses.join(" OR ")
            );
            let mut stmt = conn.prepare(&sql).map_err(map_sql_err)?;
            let like_params: Vec<String> =
                like_terms.iter().map(|t| format!("%{}%", t)).collect();
            let rows = stmt
                .query_map(rusqlite::params_from_iter(like_params), row_to_memory)
                .map_err(map_sql_err)?;
            rows.collect::<Result<Vec<_>, _>>().map_err(map_sql_err)
        })?;

        let wanted_set: std::collections::HashSet<&str> =
            wanted.iter().map(|s| s.as_str()).collect();
        Ok(candidates
            .into_iter()
            .filter(|m| {
                m.tags
                    .iter()
                    .any(|t| wanted_set.contains(t.to_lowercase().as_str()))
            })
            .collect())
    }

    /// Deduplicates memories: keeps the first occurrence (creation order),
    /// deletes any later memory whose cosine similarity against a kept row
    /// exceeds the threshold. Returns the delete count.
    pub async fn vacuum_memories(&self, threshold: f32) -> Result<usize, StoreError> {
        let all = self.list_memories().await?;
        let mut kept: Vec<&Memory> = Vec::new();
        let mut to_delete: Vec<String> = Vec::new();
        for memory in &all {
            let duplicate = !memory.embedding.is_empty()
                && kept.iter().any(|k| {
                    cosine_similarity(&k.embedding, &memory.embedding) > threshold
                });
            if duplicate {
                to_delete.push(memory.id.clone());
            } else {
                kept.push(memory);
            }
        }
        for id in &to_delete {
            self.delete_memory(id).await?;
        }
        Ok(to_delete.len())
    }
}
