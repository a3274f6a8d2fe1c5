//! Placeholder providers wired by the binary until a real LLM/embedding
//! backend is configured.
//!
//! Provider wire clients are deliberately outside the core: the engine only
//! sees the `LlmClient` and `Embedder` traits. [`UnconfiguredLlm`] fails
//! every chat turn with a pointer at the configuration; [`ZeroEmbedder`]
//! keeps the context pipeline alive with empty recall.

use async_trait::async_trait;

use monad::context::{ContextError, Embedder};
use monad::llm::{ChatRequest, LlmClient, LlmError, LlmResponse};

/// Fails every request until a provider is configured.
pub struct UnconfiguredLlm;

#[async_trait]
impl LlmClient for UnconfiguredLlm {
    fn model_name(&self) -> &str {
        "unconfigured"
    }

    async fn invoke(&self, _request: &ChatRequest) -> Result<LlmResponse, LlmError> {
        Err(LlmError::Request(
            "no LLM provider configured; set MONAD_LLM_* in ~/.config/monad/config.toml".into(),
        ))
    }
}

/// Produces zero vectors: similarity search scores nothing, recall is empty,
/// but the pipeline and memory writes keep working.
pub struct ZeroEmbedder {
    dimension: usize,
}

impl ZeroEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for ZeroEmbedder {
    async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, ContextError> {
        Ok(texts.iter().map(|_| vec![0.0; self.dimension]).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
