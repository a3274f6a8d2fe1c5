//! Tag generation for memory recall. Fault-tolerant: failures degrade to an
//! empty tag list.

use std::sync::Arc;

use async_trait::async_trait;

use crate::llm::{ChatRequest, LlmClient, PromptMessage};
use crate::model::normalize_tags;

use super::ContextError;

/// Produces search tags for a conversation excerpt.
#[async_trait]
pub trait TagGenerator: Send + Sync {
    async fn generate_tags(&self, context: &str) -> Result<Vec<String>, ContextError>;
}

const TAG_PROMPT: &str = "Extract up to 8 short lowercase topic tags for the conversation \
below. Answer with the tags only, comma separated, no explanations.";

/// Tag generator backed by the utility model.
pub struct LlmTagGenerator {
    llm: Arc<dyn LlmClient>,
}

impl LlmTagGenerator {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl TagGenerator for LlmTagGenerator {
    async fn generate_tags(&self, context: &str) -> Result<Vec<String>, ContextError> {
        let request = ChatRequest {
            messages: vec![
                PromptMessage::system(TAG_PROMPT),
                PromptMessage::user(context),
            ],
            tools: Vec::new(),
            timeout: None,
        };
        let response = self
            .llm
            .invoke(&request)
            .await
            .map_err(|e| ContextError::TagGenerationFailed(e.to_string()))?;
        Ok(parse_tags(&response.content))
    }
}

/// Splits a comma- or newline-separated tag answer into normalized tags.
pub(crate) fn parse_tags(text: &str) -> Vec<String> {
    let raw: Vec<String> = text
        .split(|c: char| c == ',' || c == '\n')
        .map(|t| t.trim().trim_matches(|c: char| c == '"' || c == '-').trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();
    normalize_tags(raw)
}
