//! Message rows: the conversation transcript of a session.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a persisted message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
    Summary,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
            MessageRole::System => "system",
            MessageRole::Tool => "tool",
            MessageRole::Summary => "summary",
        }
    }
}

impl std::str::FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "system" => Ok(MessageRole::System),
            "tool" => Ok(MessageRole::Tool),
            "summary" => Ok(MessageRole::Summary),
            other => Err(format!("unknown message role: {}", other)),
        }
    }
}

/// Subtype of a summary-role message produced by context compression.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryType {
    Topic,
    Broad,
}

impl SummaryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryType::Topic => "topic",
            SummaryType::Broad => "broad",
        }
    }
}

impl std::str::FromStr for SummaryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "topic" => Ok(SummaryType::Topic),
            "broad" => Ok(SummaryType::Broad),
            other => Err(format!("unknown summary type: {}", other)),
        }
    }
}

/// One tool call persisted on an assistant message.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

/// One persisted message.
///
/// `tool_call_id` is set if and only if `role` is [`MessageRole::Tool`].
/// Thinking never appears in `content`; the stripped block is kept in `think`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Parent message, when the transcript forms a tree.
    pub parent_id: Option<String>,
    /// Tool calls emitted by an assistant message; empty otherwise.
    pub tool_calls: Vec<ToolCallRecord>,
    /// For tool-role replies: the call this message resolves.
    pub tool_call_id: Option<String>,
    /// Chain-of-thought stripped from the streamed output.
    pub think: Option<String>,
    /// Memories recalled for the turn that produced this message.
    pub recalled_memory_ids: Vec<String>,
    /// Set only on summary-role messages.
    pub summary_type: Option<SummaryType>,
}

impl ChatMessage {
    pub fn new(session_id: impl Into<String>, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.into(),
            role,
            content: content.into(),
            created_at: Utc::now(),
            parent_id: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            think: None,
            recalled_memory_ids: Vec::new(),
            summary_type: None,
        }
    }

    /// Tool-role reply carrying the result for `tool_call_id`.
    pub fn tool_reply(
        session_id: impl Into<String>,
        tool_call_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::new(session_id, MessageRole::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// True when this assistant message still awaits a tool-role reply for
    /// at least one of its calls, given the replies seen so far.
    pub fn is_unresolved(&self, replies: &[ChatMessage]) -> bool {
        if self.role != MessageRole::Assistant || self.tool_calls.is_empty() {
            return false;
        }
        self.tool_calls.iter().any(|call| {
            !replies
                .iter()
                .any(|r| r.tool_call_id.as_deref() == Some(call.id.as_str()))
        })
    }
}
