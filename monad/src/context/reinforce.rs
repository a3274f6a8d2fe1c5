//! Embedding reinforcement from feedback signals.
//!
//! Helpful memories drift toward the (normalized) mean query vector,
//! unhelpful ones away from it. Updates go through the store; the pipeline
//! itself only ever holds copies.

use std::collections::HashMap;

use crate::store::{Store, StoreError};

/// Reinforcement learning rate.
pub const LEARNING_RATE: f32 = 0.05;

fn normalize(v: &[f32]) -> Vec<f32> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        v.to_vec()
    } else {
        v.iter().map(|x| x / norm).collect()
    }
}

fn mean_vector(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first_len = vectors.first()?.len();
    let same_dim: Vec<&Vec<f32>> = vectors.iter().filter(|v| v.len() == first_len).collect();
    if same_dim.is_empty() {
        return None;
    }
    let mut mean = vec![0f32; first_len];
    for v in &same_dim {
        for (i, x) in v.iter().enumerate() {
            mean[i] += x;
        }
    }
    let n = same_dim.len() as f32;
    for x in &mut mean {
        *x /= n;
    }
    Some(mean)
}

/// Applies `V' = normalize(V + score · η · (target − V))` for each evaluated
/// memory, where target is the unit-length mean query vector. Memories with
/// empty embeddings or mismatched dimensionality are skipped. Returns the
/// number of memories updated.
pub async fn reinforce_embeddings(
    store: &Store,
    feedback: &HashMap<String, f32>,
    query_vectors: &[Vec<f32>],
) -> Result<usize, StoreError> {
    let Some(mean) = mean_vector(query_vectors) else {
        return Ok(0);
    };
    let target = normalize(&mean);

    let mut updated = 0;
    for (memory_id, &score) in feedback {
        let score = score.clamp(-1.0, 1.0);
        let memory = match store.get_memory(memory_id).await {
            Ok(m) => m,
            Err(StoreError::NotFound(_)) => {
                tracing::debug!(memory = %memory_id, "feedback for unknown memory");
                continue;
            }
            Err(e) => return Err(e),
        };
        if memory.embedding.is_empty() || memory.embedding.len() != target.len() {
            continue;
        }
        let moved: Vec<f32> = memory
            .embedding
            .iter()
            .zip(target.iter())
            .map(|(v, t)| v + score * LEARNING_RATE * (t - v))
            .collect();
        let next = normalize(&moved);
        store.update_memory_embedding(memory_id, &next).await?;
        updated += 1;
    }
    Ok(updated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Memory;
    use crate::store::{cosine_similarity, SimilarityPolicy};

    async fn seeded(embedding: Vec<f32>) -> (Store, Memory) {
        let store = Store::open_in_memory().unwrap();
        let mut memory = Memory::new("m", "c", vec![]);
        memory.embedding = embedding;
        store
            .save_memory(&memory, SimilarityPolicy::Allow)
            .await
            .unwrap();
        (store, memory)
    }

    /// **Scenario**: Positive feedback moves the embedding toward the query
    /// and keeps it unit length.
    #[tokio::test(flavor = "multi_thread")]
    async fn positive_feedback_attracts() {
        let (store, memory) = seeded(vec![1.0, 0.0]).await;
        let queries = vec![vec![0.0, 1.0]];
        let mut feedback = HashMap::new();
        feedback.insert(memory.id.clone(), 1.0f32);

        let before = cosine_similarity(&[0.0, 1.0], &[1.0, 0.0]);
        let updated = reinforce_embeddings(&store, &feedback, &queries).await.unwrap();
        assert_eq!(updated, 1);

        let after_mem = store.get_memory(&memory.id).await.unwrap();
        let after = cosine_similarity(&[0.0, 1.0], &after_mem.embedding);
        assert!(after > before);
        let norm: f32 = after_mem.embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    /// **Scenario**: Negative feedback repels.
    #[tokio::test(flavor = "multi_thread")]
    async fn negative_feedback_repels() {
        let (store, memory) = seeded(normalize(&[1.0, 0.2])).await;
        let queries = vec![vec![1.0, 0.0]];
        let mut feedback = HashMap::new();
        feedback.insert(memory.id.clone(), -1.0f32);

        let before = cosine_similarity(&[1.0, 0.0], &store.get_memory(&memory.id).await.unwrap().embedding);
        reinforce_embeddings(&store, &feedback, &queries).await.unwrap();
        let after = cosine_similarity(&[1.0, 0.0], &store.get_memory(&memory.id).await.unwrap().embedding);
        assert!(after < before);
    }

    /// **Scenario**: Dimension mismatches and empty embeddings are skipped.
    #[tokio::test(flavor = "multi_thread")]
    async fn mismatched_dimensions_skipped() {
        let (store, memory) = seeded(vec![1.0, 0.0, 0.0]).await;
        let queries = vec![vec![1.0, 0.0]];
        let mut feedback = HashMap::new();
        feedback.insert(memory.id.clone(), 1.0f32);

        let updated = reinforce_embeddings(&store, &feedback, &queries).await.unwrap();
        assert_eq!(updated, 0);
    }

    /// **Scenario**: No query vectors means no updates.
    #[tokio::test(flavor = "multi_thread")]
    async fn no_queries_no_updates() {
        let (store, memory) = seeded(vec![1.0, 0.0]).await;
        let mut feedback = HashMap::new();
        feedback.insert(memory.id, 1.0f32);
        let updated = reinforce_embeddings(&store, &feedback, &[]).await.unwrap();
        assert_eq!(updated, 0);
    }
}
