//! Context compressor: folds older history into summary messages.
//!
//! The last [`KEEP_RAW_MESSAGES`] stay raw. Older messages are chunked at
//! explicit `mark_topic_change` boundaries (or every
//! [`FALLBACK_CHUNK_SIZE`] messages), never splitting an assistant tool
//! call from its tool replies. Each chunk becomes a `topic` summary message
//! plus a persisted compaction node; when the topic summaries together
//! exceed the token budget (or the caller asks for broad scope) they
//! collapse into one `broad` summary. Raw messages are never deleted; the
//! working history simply stops including compacted ones.

use std::sync::Arc;

use crate::llm::{ChatRequest, LlmClient, PromptMessage};
use crate::model::{
    ChatMessage, CompactionKind, CompactionNode, MessageRole, SummaryType,
};
use crate::store::{Store, StoreError};

use super::prompt::estimate_tokens;

/// Messages kept raw at the end of history.
pub const KEEP_RAW_MESSAGES: usize = 10;
/// Chunk size when no explicit topic boundaries exist.
pub const FALLBACK_CHUNK_SIZE: usize = 10;
/// Estimated-token budget for topic summaries before collapsing to broad.
pub const TOPIC_SUMMARY_TOKEN_BUDGET: usize = 2000;
/// Tool call name marking an explicit topic boundary.
pub const MARK_TOPIC_CHANGE: &str = "mark_topic_change";

/// Compression scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionScope {
    Topic,
    Broad,
}

/// Summarizes session history through the utility model.
pub struct ContextCompressor {
    store: Arc<Store>,
    utility_llm: Arc<dyn LlmClient>,
}

fn starts_topic(msg: &ChatMessage) -> bool {
    msg.tool_calls.iter().any(|c| c.name == MARK_TOPIC_CHANGE)
}

fn topic_summary_argument(msg: &ChatMessage) -> Option<String> {
    msg.tool_calls
        .iter()
        .find(|c| c.name == MARK_TOPIC_CHANGE)
        .and_then(|c| c.arguments.get("summary"))
        .and_then(|v| v.as_str())
        .map(String::from)
}

fn render_messages(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.as_str(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn node_kind(chunk: &[ChatMessage]) -> CompactionKind {
    let tool_replies = chunk
        .iter()
        .filter(|m| m.role == MessageRole::Tool)
        .count();
    match tool_replies {
        0 => CompactionKind::Broad,
        1 => CompactionKind::ToolExecution,
        _ => CompactionKind::ToolLoop,
    }
}

impl ContextCompressor {
    pub fn new(store: Arc<Store>, utility_llm: Arc<dyn LlmClient>) -> Self {
        Self { store, utility_llm }
    }

    /// History with compacted messages removed: any message referenced as a
    /// child of a compaction node is replaced by its summary message (which
    /// is backdated into the right position).
    pub async fn working_history(
        &self,
        session_id: &str,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let messages = self.store.list_messages(session_id).await?;
        let nodes = self.store.list_compaction_nodes(session_id).await?;
        let compacted: std::collections::HashSet<&str> = nodes
            .iter()
            .flat_map(|n| n.child_ids.iter().map(|s| s.as_str()))
            .collect();
        Ok(messages
            .into_iter()
            .filter(|m| !compacted.contains(m.id.as_str()))
            .collect())
    }

    async fn summarize(&self, text: &str, instruction: &str) -> Result<String, StoreError> {
        let request = ChatRequest {
            messages: vec![
                PromptMessage::system(instruction),
                PromptMessage::user(text),
            ],
            tools: Vec::new(),
            timeout: None,
        };
        match self.utility_llm.invoke(&request).await {
            Ok(response) if !response.content.trim().is_empty() => {
                Ok(response.content.trim().to_string())
            }
            Ok(_) => Ok(text.chars().take(400).collect()),
            Err(e) => {
                tracing::warn!(error = %e, "summary generation failed; using excerpt");
                Ok(text.chars().take(400).collect())
            }
        }
    }

    /// Splits older history into chunks at topic boundaries or the fallback
    /// size, never separating a tool call from its replies.
    fn chunk(older: &[ChatMessage]) -> Vec<Vec<ChatMessage>> {
        let mut chunks: Vec<Vec<ChatMessage>> = Vec::new();
        let mut current: Vec<ChatMessage> = Vec::new();
        for msg in older {
            let explicit_boundary = starts_topic(msg) && !current.is_empty();
            // A cut lands before `msg`; never cut before a tool reply so it
            // stays in the same chunk as its call.
            let size_boundary = current.len() >= FALLBACK_CHUNK_SIZE
                && msg.role != MessageRole::Tool
                && !explicit_boundary;

            if explicit_boundary || size_boundary {
                chunks.push(std::mem::take(&mut current));
            }
            current.push(msg.clone());
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }

    /// Runs one compression pass. Returns the new working history.
    pub async fn compress(
        &self,
        session_id: &str,
        scope: CompressionScope,
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let working = self.working_history(session_id).await?;
        if working.len() <= KEEP_RAW_MESSAGES {
            return Ok(working);
        }

        let mut boundary = working.len() - KEEP_RAW_MESSAGES;
        // Keep an assistant tool call together with its replies in the raw
        // tail rather than splitting the adjacency.
        while boundary > 0 && working[boundary].role == MessageRole::Tool {
            boundary -= 1;
        }
        if boundary == 0 {
            return Ok(working);
        }
        let older = &working[..boundary];

        let mut topic_summaries: Vec<ChatMessage> = Vec::new();
        for chunk in Self::chunk(older) {
            let summary_text = match chunk.iter().find_map(topic_summary_argument) {
                Some(provided) => provided,
                None => {
                    self.summarize(
                        &render_messages(&chunk),
                        "Summarize this conversation segment in a short paragraph. \
                         Keep decisions, facts, and open questions.",
                    )
                    .await?
                }
            };

            let mut summary = ChatMessage::new(session_id, MessageRole::Summary, summary_text);
            summary.summary_type = Some(SummaryType::Topic);
            summary.created_at = chunk[0].created_at;
            self.store.save_message(&summary).await?;

            let mut node = CompactionNode::new(session_id, node_kind(&chunk));
            node.child_ids = chunk.iter().map(|m| m.id.clone()).collect();
            node.display_hint = format!("{} messages", chunk.len());
            node.metadata
                .insert("summaryType".into(), SummaryType::Topic.as_str().into());
            node.metadata
                .insert("summaryMessageId".into(), summary.id.clone());
            self.store.save_compaction_node(&node).await?;

            topic_summaries.push(summary);
        }

        let total_tokens: usize = topic_summaries
            .iter()
            .map(|s| estimate_tokens(&s.content))
            .sum();
        if scope == CompressionScope::Broad || total_tokens > TOPIC_SUMMARY_TOKEN_BUDGET {
            let combined = topic_summaries
                .iter()
                .map(|s| s.content.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            let broad_text = self
                .summarize(
                    &combined,
                    "Condense these topic summaries into one broad summary of the \
                     conversation so far.",
                )
                .await?;

            let mut broad = ChatMessage::new(session_id, MessageRole::Summary, broad_text);
            broad.summary_type = Some(SummaryType::Broad);
            broad.created_at = topic_summaries[0].created_at;
            self.store.save_message(&broad).await?;

            let mut node = CompactionNode::new(session_id, CompactionKind::Broad);
            node.child_ids = topic_summaries.iter().map(|s| s.id.clone()).collect();
            node.display_hint = format!("{} topics", topic_summaries.len());
            node.metadata
                .insert("summaryType".into(), SummaryType::Broad.as_str().into());
            node.metadata
                .insert("summaryMessageId".into(), broad.id.clone());
            self.store.save_compaction_node(&node).await?;
        }

        self.working_history(session_id).await
    }
}
