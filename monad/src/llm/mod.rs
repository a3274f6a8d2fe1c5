//! LLM client abstraction for the chat engine.
//!
//! Provider-specific wire clients live outside the core; the engine sees one
//! streaming chat interface. Implementations that support true streaming send
//! [`MessageChunk`] tokens and [`ToolCallDelta`] fragments through the
//! optional channels while still returning the complete [`LlmResponse`] at
//! the end; the default implementation degrades to a single chunk.

mod mock;

pub use mock::MockLlm;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::tools::ToolSpec;

/// Default request timeout.
pub const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(60);
/// Timeout for local providers (slower first-token latency).
pub const LOCAL_LLM_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("llm request failed: {0}")]
    Request(String),
    /// The prompt no longer fits the model's context window; the engine
    /// reacts by compressing history and retrying.
    #[error("context window exceeded")]
    ContextWindow,
    #[error("llm request timed out")]
    Timeout,
}

/// Role of one prompt message sent to the model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptRole {
    System,
    User,
    Assistant,
    Tool,
}

/// One message in the model prompt.
#[derive(Clone, Debug)]
pub struct PromptMessage {
    pub role: PromptRole,
    pub content: String,
    /// Completed tool calls on assistant messages.
    pub tool_calls: Vec<ToolCall>,
    /// For tool-role messages: the call being answered.
    pub tool_call_id: Option<String>,
}

impl PromptMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::System,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::User,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Assistant,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: PromptRole::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// One complete tool call in an LLM response. Arguments are the raw JSON
/// string as produced by the model.
#[derive(Clone, Debug, Default)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Delta for one tool call from LLM streaming; deltas sharing an index
/// belong to the same call and concatenate.
#[derive(Clone, Debug)]
pub struct ToolCallDelta {
    pub index: usize,
    pub call_id: Option<String>,
    pub name: Option<String>,
    pub arguments_delta: String,
}

/// One streamed content token (or batch of tokens).
#[derive(Clone, Debug)]
pub struct MessageChunk {
    pub content: String,
}

/// Token usage for one LLM call.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct LlmUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One chat request: prompt plus the tool catalog for this turn.
#[derive(Clone, Debug, Default)]
pub struct ChatRequest {
    pub messages: Vec<PromptMessage>,
    pub tools: Vec<ToolSpec>,
    /// Request timeout; `None` means [`DEFAULT_LLM_TIMEOUT`].
    pub timeout: Option<Duration>,
}

/// Complete response from one LLM call.
#[derive(Clone, Debug, Default)]
pub struct LlmResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<LlmUsage>,
    pub finish_reason: Option<String>,
}

/// LLM client: given a request, returns assistant text and optional tool
/// calls. The streaming variant additionally emits tokens and tool-call
/// deltas as they arrive.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Model identifier reported in generation metadata.
    fn model_name(&self) -> &str;

    /// One complete chat turn.
    async fn invoke(&self, request: &ChatRequest) -> Result<LlmResponse, LlmError>;

    /// Streaming variant. When the senders are present, implementations send
    /// tokens/deltas as they arrive; the complete response is still returned.
    ///
    /// Default implementation calls [`invoke`](Self::invoke) and forwards the
    /// full content as one chunk and each tool call as one delta.
    async fn invoke_stream(
        &self,
        request: &ChatRequest,
        chunk_tx: Option<mpsc::Sender<MessageChunk>>,
        tool_delta_tx: Option<mpsc::Sender<ToolCallDelta>>,
    ) -> Result<LlmResponse, LlmError> {
        let response = self.invoke(request).await?;
        if let Some(tx) = chunk_tx {
            if !response.content.is_empty() {
                let _ = tx
                    .send(MessageChunk {
                        content: response.content.clone(),
                    })
                    .await;
            }
        }
        if let Some(tx) = tool_delta_tx {
            for (index, call) in response.tool_calls.iter().enumerate() {
                let _ = tx
                    .send(ToolCallDelta {
                        index,
                        call_id: Some(call.id.clone()),
                        name: Some(call.name.clone()),
                        arguments_delta: call.arguments.clone(),
                    })
                    .await;
            }
        }
        Ok(response)
    }
}
