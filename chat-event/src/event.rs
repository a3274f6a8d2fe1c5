//! Chat stream event types (type + payload).
//! Message-shaped payloads use `serde_json::Value`; the core serializes its
//! persisted message type into that.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One accumulated or in-flight tool call from the LLM stream.
///
/// `index` is the position assigned by the provider stream; deltas for the
/// same call share an index and are concatenated by the engine.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ToolCallChunk {
    pub index: usize,
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Metadata sent once per turn before generation starts: what the context
/// pipeline recalled for this turn.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ContextMetadata {
    pub recalled_memory_ids: Vec<String>,
    pub note_names: Vec<String>,
}

/// Metadata for a completed generation.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub model: String,
    pub finish_reason: Option<String>,
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub duration_ms: u64,
    pub tokens_per_second: f64,
    pub turn_count: u32,
}

/// Execution status for one dispatched tool call.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ToolExecutionStatus {
    Attempting { name: String, reference: String },
    Success { result: String },
    Failure { error: String },
}

/// Chat stream event: wire shape for one delta emitted during a chat turn.
/// The stream always terminates with `stream_completed`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatDelta {
    GenerationContext {
        metadata: ContextMetadata,
    },
    Delta {
        content: String,
    },
    Thought {
        content: String,
    },
    ThoughtCompleted,
    ToolCall {
        call: ToolCallChunk,
    },
    ToolCallError {
        call_id: String,
        name: String,
        error: String,
    },
    ToolExecution {
        call_id: String,
        status: ToolExecutionStatus,
    },
    GenerationCompleted {
        message: Value,
        metadata: GenerationMetadata,
    },
    Error {
        message: String,
    },
    StreamCompleted,
}

impl ChatDelta {
    /// Serializes this event to a JSON object (type + payload).
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
