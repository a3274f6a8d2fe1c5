//! Mock LLM for tests.
//!
//! Returns a scripted sequence of responses, repeating the last one when the
//! script runs out. Optional character-by-character streaming exercises the
//! chunk path.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{
    ChatRequest, LlmClient, LlmError, LlmResponse, MessageChunk, ToolCall, ToolCallDelta,
};

/// Mock LLM: scripted responses in order.
pub struct MockLlm {
    responses: Mutex<VecDeque<LlmResponse>>,
    last: LlmResponse,
    stream_by_char: bool,
    model: String,
}

impl MockLlm {
    /// A mock that always answers with plain text and no tool calls.
    pub fn with_no_tool_calls(content: impl Into<String>) -> Self {
        let response = LlmResponse {
            content: content.into(),
            finish_reason: Some("stop".into()),
            ..Default::default()
        };
        Self::with_responses(vec![response])
    }

    /// A mock that plays the given responses in order, then repeats the last.
    pub fn with_responses(responses: Vec<LlmResponse>) -> Self {
        let last = responses
            .last()
            .cloned()
            .unwrap_or_default();
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            last,
            stream_by_char: false,
            model: "mock".to_string(),
        }
    }

    /// First response carries one tool call, second is a plain answer.
    pub fn first_tools_then_end(
        name: impl Into<String>,
        arguments: impl Into<String>,
        final_content: impl Into<String>,
    ) -> Self {
        let call = ToolCall {
            id: "call-1".to_string(),
            name: name.into(),
            arguments: arguments.into(),
        };
        Self::with_responses(vec![
            LlmResponse {
                content: String::new(),
                tool_calls: vec![call],
                finish_reason: Some("tool_calls".into()),
                ..Default::default()
            },
            LlmResponse {
                content: final_content.into(),
                finish_reason: Some("stop".into()),
                ..Default::default()
            },
        ])
    }

    /// Streams content one character per chunk.
    pub fn with_stream_by_char(mut self) -> Self {
        self.stream_by_char = true;
        self
    }

    fn next_response(&self) -> LlmResponse {
        let mut queue = match self.responses.lock() {
            Ok(q) => q,
            Err(poisoned) => poisoned.into_inner(),
        };
        queue.pop_front().unwrap_or_else(|| self.last.clone())
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn invoke(&self, _request: &ChatRequest) -> Result<LlmResponse, LlmError> {
        Ok(self.next_response())
    }

    async fn invoke_stream(
        &self,
        _request: &ChatRequest,
        chunk_tx: Option<mpsc::Sender<MessageChunk>>,
        tool_delta_tx: Option<mpsc::Sender<ToolCallDelta>>,
    ) -> Result<LlmResponse, LlmError> {
        let response = self.next_response();
        if let Some(tx) = chunk_tx {
            if self.stream_by_char {
                for ch in response.content.chars() {
                    let _ = tx
                        .send(MessageChunk {
                            content: ch.to_string(),
                        })
                        .await;
                }
            } else if !response.content.is_empty() {
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

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Scripted responses play in order, then the last repeats.
    #[tokio::test]
    async fn scripted_order() {
        let llm = MockLlm::first_tools_then_end("get_time", "{}", "done");
        let first = llm.invoke(&ChatRequest::default()).await.unwrap();
        assert_eq!(first.tool_calls.len(), 1);
        let second = llm.invoke(&ChatRequest::default()).await.unwrap();
        assert_eq!(second.content, "done");
        let third = llm.invoke(&ChatRequest::default()).await.unwrap();
        assert_eq!(third.content, "done");
    }

    /// **Scenario**: Char streaming produces one chunk per character.
    #[tokio::test]
    async fn char_streaming() {
        let llm = MockLlm::with_no_tool_calls("abc").with_stream_by_char();
        let (tx, mut rx) = mpsc::channel(8);
        llm.invoke_stream(&ChatRequest::default(), Some(tx), None)
            .await
            .unwrap();
        let mut got = String::new();
        while let Ok(chunk) = rx.try_recv() {
            got.push_str(&chunk.content);
        }
        assert_eq!(got, "abc");
    }
}
