//! Embedder abstraction: text to fixed-dimension vectors.
//!
//! Provider wire details live outside the core. [`MockEmbedder`] produces
//! deterministic vectors for tests.

use async_trait::async_trait;

use super::ContextError;

/// Embeds text into vectors of a fixed dimensionality.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ContextError>;

    fn dimension(&self) -> usize;
}

/// Deterministic embedder for tests: folds bytes into the vector.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ContextError> {
        Ok(texts
            .iter()
            .map(|t| {
                let mut v = vec![0f32; self.dimension];
                for (i, b) in t.bytes().enumerate() {
                    v[i % self.dimension] += b as f32 / 256.0;
                }
                v
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Embedder that always fails; exercises the `EmbeddingFailed` path.
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _texts: &[&str]) -> Result<Vec<Vec<f32>>, ContextError> {
        Err(ContextError::EmbeddingFailed("embedder offline".to_string()))
    }

    fn dimension(&self) -> usize {
        0
    }
}
