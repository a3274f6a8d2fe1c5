//! Prompt assembly: system instructions from persona, guardrails, notes,
//! and recalled memories, plus history mapping to LLM prompt messages.

use crate::context::{Note, RecalledContext};
use crate::llm::{PromptMessage, PromptRole, ToolCall};
use crate::model::{AgentProfile, ChatMessage, MessageRole};

/// Base instructions for interactive chat turns.
pub const CHAT_SYSTEM_PROMPT: &str = "You are Monad, a capable assistant with tools. \
Use tools when they help; answer directly when they do not. Keep answers grounded \
in the provided notes and memories when relevant.";

/// Rough token estimate used for compression budgeting.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Composes the system prompt: base instructions, persona, guardrails, then
/// notes and recalled memories. Empty sections are omitted.
pub fn compose_system_prompt(
    base: &str,
    persona: Option<&str>,
    guardrails: Option<&str>,
    notes: &[Note],
    recalled: &RecalledContext,
) -> String {
    let profile = AgentProfile {
        id: String::new(),
        name: String::new(),
        description: String::new(),
        system_prompt: base.to_string(),
        persona: persona.map(String::from),
        guardrails: guardrails.map(String::from),
    };
    let mut parts = vec![profile.compose_prompt()];

    let other_notes: Vec<&Note> = notes
        .iter()
        .filter(|n| n.name != "Persona" && n.name != "Guardrails")
        .collect();
    if !other_notes.is_empty() {
        let mut section = String::from("## Notes");
        for note in other_notes {
            section.push_str(&format!("\n### {}\n{}", note.name, note.content.trim()));
        }
        parts.push(section);
    }

    if !recalled.memories.is_empty() {
        let mut section = String::from("## Recalled Memories");
        for hit in &recalled.memories {
            section.push_str(&format!(
                "\n- {}: {}",
                hit.memory.title,
                hit.memory.content.trim()
            ));
        }
        parts.push(section);
    }

    parts.join("\n\n")
}

/// Maps persisted history into the model prompt. Summary messages become
/// system-role context; thinking is never replayed.
pub fn to_prompt_messages(history: &[ChatMessage]) -> Vec<PromptMessage> {
    history
        .iter()
        .map(|msg| match msg.role {
            MessageRole::User => PromptMessage::user(&msg.content),
            MessageRole::Assistant => {
                let mut out = PromptMessage::assistant(&msg.content);
                out.tool_calls = msg
                    .tool_calls
                    .iter()
                    .map(|c| ToolCall {
                        id: c.id.clone(),
                        name: c.name.clone(),
                        arguments: c.arguments.to_string(),
                    })
                    .collect();
                out
            }
            MessageRole::System => PromptMessage::system(&msg.content),
            MessageRole::Tool => PromptMessage::tool(
                msg.tool_call_id.clone().unwrap_or_default(),
                &msg.content,
            ),
            MessageRole::Summary => PromptMessage {
                role: PromptRole::System,
                content: format!("[Conversation summary] {}", msg.content),
                tool_calls: Vec::new(),
                tool_call_id: None,
            },
        })
        .collect()
}
