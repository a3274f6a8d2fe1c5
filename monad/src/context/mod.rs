//! Context/RAG pipeline.
//!
//! Given a user query: augment with recent history, generate tags
//! (fault-tolerant), embed the query (required), run semantic and tag search
//! in parallel, then re-rank with tag boost and time decay. Notes load in
//! parallel with the memory leg. Reinforcement updates from feedback signals
//! live in [`reinforce`].

mod embedder;
mod notes;
pub mod rank;
pub mod reinforce;
mod tags;

pub use embedder::{Embedder, FailingEmbedder, MockEmbedder};
pub use notes::{load_notes, Note};
pub use rank::{RecalledMemory, HALF_LIFE_DAYS, SEMANTIC_MIN_SIMILARITY, TAG_BOOST};
pub use reinforce::{reinforce_embeddings, LEARNING_RATE};
pub use tags::{LlmTagGenerator, TagGenerator};

use std::path::PathBuf;
use std::sync::Arc;

use crate::model::{ChatMessage, MessageRole};
use crate::store::Store;

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// Embedding is mandatory; this aborts the pipeline.
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),
    /// Tag generation is optional; callers log this and continue untagged.
    #[error("tag generation failed: {0}")]
    TagGenerationFailed(String),
    #[error("persistence failed: {0}")]
    Persistence(String),
}

/// Progress states reported while building context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContextProgress {
    Augmenting,
    Tagging,
    Embedding,
    Searching,
    Ranking,
    Complete,
}

/// Everything recalled for one turn.
#[derive(Clone, Debug, Default)]
pub struct RecalledContext {
    pub memories: Vec<RecalledMemory>,
    pub notes: Vec<Note>,
    pub tags: Vec<String>,
    pub query_embedding: Vec<f32>,
}

impl RecalledContext {
    pub fn memory_ids(&self) -> Vec<String> {
        self.memories.iter().map(|m| m.memory.id.clone()).collect()
    }

    pub fn note_names(&self) -> Vec<String> {
        self.notes.iter().map(|n| n.name.clone()).collect()
    }
}

type ProgressFn = dyn Fn(ContextProgress) + Send + Sync;

/// Per-session context manager.
pub struct ContextManager {
    store: Arc<Store>,
    embedder: Arc<dyn Embedder>,
    tag_generator: Option<Arc<dyn TagGenerator>>,
    /// Session working directory holding `Notes/`.
    workspace_root: PathBuf,
}

impl ContextManager {
    pub fn new(
        store: Arc<Store>,
        embedder: Arc<dyn Embedder>,
        tag_generator: Option<Arc<dyn TagGenerator>>,
        workspace_root: PathBuf,
    ) -> Self {
        Self {
            store,
            embedder,
            tag_generator,
            workspace_root,
        }
    }

    /// Tag-generation context: the last three user/assistant messages plus
    /// the query. Tool-role traffic is excluded.
    fn augment(query: &str, history: &[ChatMessage]) -> String {
        let mut parts: Vec<String> = history
            .iter()
            .rev()
            .filter(|m| matches!(m.role, MessageRole::User | MessageRole::Assistant))
            .take(3)
            .map(|m| m.content.clone())
            .collect();
        parts.reverse();
        parts.push(query.to_string());
        parts.join("\n")
    }

    /// Builds the recalled context for one turn. See module docs.
    pub async fn build_context(
        &self,
        query: &str,
        history: &[ChatMessage],
        limit: usize,
        progress: Option<&ProgressFn>,
    ) -> Result<RecalledContext, ContextError> {
        let report = |state: ContextProgress| {
            if let Some(f) = progress {
                f(state);
            }
        };

        report(ContextProgress::Augmenting);
        let augmented = Self::augment(query, history);

        let notes_leg = load_notes(&self.store, &self.workspace_root);
        let memories_leg = self.build_memories(query, &augmented, limit, &report);
        let (notes, memories) = tokio::join!(notes_leg, memories_leg);
        let (memories, tags, query_embedding) = memories?;

        report(ContextProgress::Complete);
        Ok(RecalledContext {
            memories,
            notes,
            tags,
            query_embedding,
        })
    }

    async fn build_memories(
        &self,
        query: &str,
        augmented: &str,
        limit: usize,
        report: &impl Fn(ContextProgress),
    ) -> Result<(Vec<RecalledMemory>, Vec<String>, Vec<f32>), ContextError> {
        report(ContextProgress::Tagging);
        let tags = match &self.tag_generator {
            Some(generator) => match generator.generate_tags(augmented).await {
                Ok(tags) => tags,
                Err(e) => {
                    tracing::warn!(error = %e, "tag generation failed; continuing untagged");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };

        report(ContextProgress::Embedding);
        let vectors = self.embedder.embed(&[query]).await?;
        let query_embedding = vectors
            .into_iter()
            .next()
            .ok_or_else(|| ContextError::EmbeddingFailed("no vector returned".to_string()))?;

        report(ContextProgress::Searching);
        let semantic_leg = self.store.search_memories(
            &query_embedding,
            limit * 2,
            SEMANTIC_MIN_SIMILARITY,
        );
        let tag_leg = self.store.search_memories_by_tags(&tags);
        let (semantic, tag_matches) = tokio::join!(semantic_leg, tag_leg);
        let semantic = semantic.map_err(|e| ContextError::Persistence(e.to_string()))?;
        let tag_matches = tag_matches.map_err(|e| ContextError::Persistence(e.to_string()))?;

        report(ContextProgress::Ranking);
        let ranked = rank::merge_and_rank(
            semantic,
            tag_matches,
            &query_embedding,
            chrono::Utc::now(),
            limit,
        );
        Ok((ranked, tags, query_embedding))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Memory;
    use crate::store::SimilarityPolicy;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedTags(Vec<String>);

    #[async_trait]
    impl TagGenerator for FixedTags {
        async fn generate_tags(&self, _context: &str) -> Result<Vec<String>, ContextError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenTags;

    #[async_trait]
    impl TagGenerator for BrokenTags {
        async fn generate_tags(&self, _context: &str) -> Result<Vec<String>, ContextError> {
            Err(ContextError::TagGenerationFailed("utility model down".into()))
        }
    }

    async fn store_with_memory(embedder: &MockEmbedder, text: &str, tags: Vec<String>) -> (Arc<Store>, Memory) {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let mut memory = Memory::new(text, text, tags);
        memory.embedding = embedder.embed(&[text]).await.unwrap().remove(0);
        store
            .save_memory(&memory, SimilarityPolicy::Allow)
            .await
            .unwrap();
        (store, memory)
    }

    /// **Scenario**: The pipeline recalls a matching memory and reports all
    /// progress states in order.
    #[tokio::test(flavor = "multi_thread")]
    async fn recalls_and_reports_progress() {
        let embedder = MockEmbedder::new(64);
        let (store, memory) =
            store_with_memory(&embedder, "rust memory management", vec![]).await;
        let dir = tempfile::tempdir().unwrap();
        let manager = ContextManager::new(
            store,
            Arc::new(MockEmbedder::new(64)),
            None,
            dir.path().to_path_buf(),
        );

        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let progress = move |state: ContextProgress| {
            seen_clone.lock().unwrap().push(state);
        };

        let context = manager
            .build_context("rust memory management", &[], 5, Some(&progress))
            .await
            .unwrap();
        assert!(context.memory_ids().contains(&memory.id));

        let states = seen.lock().unwrap().clone();
        assert_eq!(
            states,
            vec![
                ContextProgress::Augmenting,
                ContextProgress::Tagging,
                ContextProgress::Embedding,
                ContextProgress::Searching,
                ContextProgress::Ranking,
                ContextProgress::Complete,
            ]
        );
    }

    /// **Scenario**: Tag-generation failure degrades to an empty tag list
    /// instead of aborting.
    #[tokio::test(flavor = "multi_thread")]
    async fn tag_failure_tolerated() {
        let embedder = MockEmbedder::new(64);
        let (store, _memory) = store_with_memory(&embedder, "some text", vec![]).await;
        let dir = tempfile::tempdir().unwrap();
        let manager = ContextManager::new(
            store,
            Arc::new(MockEmbedder::new(64)),
            Some(Arc::new(BrokenTags)),
            dir.path().to_path_buf(),
        );

        let context = manager.build_context("some text", &[], 5, None).await.unwrap();
        assert!(context.tags.is_empty());
    }

    /// **Scenario**: Embedding failure propagates.
    #[tokio::test(flavor = "multi_thread")]
    async fn embedding_failure_propagates() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let dir = tempfile::tempdir().unwrap();
        let manager = ContextManager::new(
            store,
            Arc::new(FailingEmbedder),
            None,
            dir.path().to_path_buf(),
        );
        let err = manager.build_context("q", &[], 5, None).await.unwrap_err();
        assert!(matches!(err, ContextError::EmbeddingFailed(_)));
    }

    /// **Scenario**: A tag hit found only by tag search is recalled with the
    /// boost even when semantically distant.
    #[tokio::test(flavor = "multi_thread")]
    async fn tag_only_hit_recalled() {
        let embedder = MockEmbedder::new(64);
        let (store, memory) =
            store_with_memory(&embedder, "completely unrelated text", vec!["deploy".into()])
                .await;
        let dir = tempfile::tempdir().unwrap();
        let manager = ContextManager::new(
            store,
            Arc::new(MockEmbedder::new(64)),
            Some(Arc::new(FixedTags(vec!["deploy".into()]))),
            dir.path().to_path_buf(),
        );

        let context = manager
            .build_context("ship the release", &[], 5, None)
            .await
            .unwrap();
        let hit = context
            .memories
            .iter()
            .find(|m| m.memory.id == memory.id)
            .expect("tag-only memory recalled");
        assert!(hit.matched_tag);
    }

    /// **Scenario**: Augmentation takes the last three user/assistant
    /// messages and skips tool traffic.
    #[test]
    fn augment_skips_tool_messages() {
        let mk = |role, text: &str| ChatMessage::new("s", role, text);
        let history = vec![
            mk(MessageRole::User, "one"),
            mk(MessageRole::Assistant, "two"),
            mk(MessageRole::Tool, "tool noise"),
            mk(MessageRole::User, "three"),
            mk(MessageRole::Assistant, "four"),
        ];
        let augmented = ContextManager::augment("query", &history);
        assert_eq!(augmented, "two\nthree\nfour\nquery");
    }
}
