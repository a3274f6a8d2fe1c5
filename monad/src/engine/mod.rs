//! Chat engine: one user turn as a ReAct loop over an LLM stream.
//!
//! The engine gathers context, aggregates tools, drives the model, parses
//! the stream live (thinking vs content), executes tool calls through the
//! session's tool set, and persists every message. Client-owned tools defer
//! the loop: the assistant message stays unresolved until a follow-up turn
//! carries the tool outputs. Overflow (or turn exhaustion) triggers the
//! context compressor, first at topic scope, then broad.

pub mod compressor;
pub mod prompt;

pub use compressor::{
    CompressionScope, ContextCompressor, FALLBACK_CHUNK_SIZE, KEEP_RAW_MESSAGES,
    TOPIC_SUMMARY_TOKEN_BUDGET,
};

use std::sync::Arc;

use chat_event::{
    ChatDelta, ContextMetadata, GenerationMetadata, ToolCallChunk, ToolExecutionStatus,
};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::context::ContextError;
use crate::llm::{
    ChatRequest, LlmClient, LlmError, LlmUsage, PromptMessage, ToolCall, ToolCallDelta,
};
use crate::model::{ChatMessage, MessageRole, ToolCallRecord};
use crate::parser::{extract_tool_calls, StreamingParser};
use crate::session::{DebugSnapshot, SessionError, SessionManager, ToolCallTrace};
use crate::store::StoreError;
use crate::tools::{Tool, ToolCallContext, ToolError, ToolSpec};

/// Bound on LLM↔tool iterations within one user turn.
pub const MAX_TURNS: u32 = 5;
/// Memories recalled per turn.
const RECALL_LIMIT: usize = 5;
/// Outbound delta queue; backpressure here pauses LLM consumption.
const EVENT_QUEUE_CAPACITY: usize = 128;
/// Topic compression, then broad; after that the turn fails.
const MAX_COMPRESSION_ATTEMPTS: u8 = 2;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("turn limit exhausted after compression")]
    TurnLimit,
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("persistence: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Context(#[from] ContextError),
    #[error(transparent)]
    Tools(#[from] ToolError),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

/// One resolved client tool output supplied by a follow-up request.
#[derive(Clone, Debug)]
pub struct ToolOutput {
    pub tool_call_id: String,
    pub content: String,
}

/// One chat turn request.
#[derive(Clone, Debug, Default)]
pub struct ChatTurnRequest {
    pub content: String,
    /// Outputs resolving previously deferred client tool calls.
    pub tool_outputs: Vec<ToolOutput>,
    /// Replaces the base system instructions; used by job agents to run
    /// their composed profile prompt.
    pub system_preamble: Option<String>,
}

/// Drives chat turns for sessions.
pub struct ChatEngine {
    sessions: Arc<SessionManager>,
    llm: Arc<dyn LlmClient>,
    compressor: ContextCompressor,
}

struct PumpedStream {
    response: crate::llm::LlmResponse,
    /// Tool calls accumulated from deltas by index, for providers that only
    /// stream fragments.
    accumulated: Vec<ToolCall>,
}

enum PumpOutcome {
    Streamed(PumpedStream),
    Cancelled,
}

impl ChatEngine {
    pub fn new(
        sessions: Arc<SessionManager>,
        llm: Arc<dyn LlmClient>,
        utility_llm: Arc<dyn LlmClient>,
    ) -> Self {
        let compressor = ContextCompressor::new(Arc::clone(sessions.store()), utility_llm);
        Self {
            sessions,
            llm,
            compressor,
        }
    }

    pub fn compressor(&self) -> &ContextCompressor {
        &self.compressor
    }

    /// Executes one turn, streaming deltas to the returned receiver. The
    /// stream always ends with `stream_completed`; dropping the receiver
    /// cancels the turn without persisting a partial assistant message.
    pub fn stream_turn(
        self: &Arc<Self>,
        session_id: &str,
        request: ChatTurnRequest,
    ) -> mpsc::Receiver<ChatDelta> {
        let (tx, rx) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let engine = Arc::clone(self);
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = engine.run_turn(&session_id, request, &tx).await {
                tracing::warn!(session = %session_id, error = %e, "chat turn failed");
                let _ = tx
                    .send(ChatDelta::Error {
                        message: e.to_string(),
                    })
                    .await;
            }
            let _ = tx.send(ChatDelta::StreamCompleted).await;
        });
        rx
    }

    async fn run_turn(
        &self,
        session_id: &str,
        request: ChatTurnRequest,
        tx: &mpsc::Sender<ChatDelta>,
    ) -> Result<(), EngineError> {
        let store = Arc::clone(self.sessions.store());

        for output in &request.tool_outputs {
            store
                .save_message(&ChatMessage::tool_reply(
                    session_id,
                    &output.tool_call_id,
                    &output.content,
                ))
                .await?;
        }

        let content = request.content.trim().to_string();
        if content.is_empty() && request.tool_outputs.is_empty() {
            return Err(EngineError::InvalidRequest(
                "a turn needs user content or tool outputs".to_string(),
            ));
        }
        if !content.is_empty() {
            store
                .save_message(&ChatMessage::new(session_id, MessageRole::User, &content))
                .await?;
        }

        let handles = self.sessions.handles(session_id).await?;
        let tools = handles.tools.aggregate().await?;
        let specs: Vec<ToolSpec> = tools.iter().map(|t| t.spec()).collect();

        let history = store.list_messages(session_id).await?;
        let query = if !content.is_empty() {
            content.clone()
        } else {
            history
                .iter()
                .rev()
                .find(|m| m.role == MessageRole::User)
                .map(|m| m.content.clone())
                .unwrap_or_default()
        };
        let recalled = handles
            .context
            .build_context(&query, &history, RECALL_LIMIT, None)
            .await?;
        if tx
            .send(ChatDelta::GenerationContext {
                metadata: ContextMetadata {
                    recalled_memory_ids: recalled.memory_ids(),
                    note_names: recalled.note_names(),
                },
            })
            .await
            .is_err()
        {
            return Ok(());
        }

        let session_row = store.get_session(session_id).await?;
        let persona = recalled
            .notes
            .iter()
            .find(|n| n.name == "Persona")
            .map(|n| n.content.clone())
            .or_else(|| session_row.persona.clone());
        let guardrails = recalled
            .notes
            .iter()
            .find(|n| n.name == "Guardrails")
            .map(|n| n.content.clone());
        let system_prompt = prompt::compose_system_prompt(
            request
                .system_preamble
                .as_deref()
                .unwrap_or(prompt::CHAT_SYSTEM_PROMPT),
            persona.as_deref(),
            guardrails.as_deref(),
            &recalled.notes,
            &recalled,
        );

        let working = self.compressor.working_history(session_id).await?;
        let mut messages = vec![PromptMessage::system(&system_prompt)];
        messages.extend(prompt::to_prompt_messages(&working));

        let started = std::time::Instant::now();
        let mut total_usage = LlmUsage::default();
        let mut last_finish: Option<String> = None;
        let mut turn: u32 = 0;
        let mut compression_attempts: u8 = 0;
        let mut traces: Vec<ToolCallTrace> = Vec::new();

        loop {
            if turn >= MAX_TURNS {
                if compression_attempts >= MAX_COMPRESSION_ATTEMPTS {
                    return Err(EngineError::TurnLimit);
                }
                messages = self
                    .compress_and_rebuild(session_id, &system_prompt, compression_attempts)
                    .await?;
                compression_attempts += 1;
                turn = 0;
                continue;
            }
            turn += 1;

            let chat_request = ChatRequest {
                messages: messages.clone(),
                tools: specs.clone(),
                timeout: None,
            };
            let mut parser = StreamingParser::new();
            let streamed = match self.pump_stream(&chat_request, tx, &mut parser).await {
                Ok(PumpOutcome::Cancelled) => return Ok(()),
                Ok(PumpOutcome::Streamed(s)) => s,
                Err(EngineError::Llm(LlmError::ContextWindow)) => {
                    if compression_attempts >= MAX_COMPRESSION_ATTEMPTS {
                        return Err(EngineError::Llm(LlmError::ContextWindow));
                    }
                    messages = self
                        .compress_and_rebuild(session_id, &system_prompt, compression_attempts)
                        .await?;
                    compression_attempts += 1;
                    turn -= 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if let Some(usage) = &streamed.response.usage {
                total_usage.prompt_tokens += usage.prompt_tokens;
                total_usage.completion_tokens += usage.completion_tokens;
                total_usage.total_tokens += usage.total_tokens;
            }
            last_finish = streamed.response.finish_reason.clone();

            let parsed = parser.finalize();
            let (clean_content, embedded) = extract_tool_calls(&parsed.content);
            let mut calls: Vec<ToolCall> = if streamed.response.tool_calls.is_empty() {
                streamed.accumulated
            } else {
                streamed.response.tool_calls.clone()
            };
            for extracted in embedded {
                calls.push(ToolCall {
                    id: format!("embedded-{}", uuid::Uuid::new_v4().simple()),
                    name: extracted.name,
                    arguments: extracted.arguments.to_string(),
                });
            }

            if calls.is_empty() {
                let mut final_msg =
                    ChatMessage::new(session_id, MessageRole::Assistant, clean_content.trim());
                if !parsed.thinking.is_empty() {
                    final_msg.think = Some(parsed.thinking);
                }
                final_msg.recalled_memory_ids = recalled.memory_ids();
                store.save_message(&final_msg).await?;

                let duration = started.elapsed();
                let seconds = duration.as_secs_f64();
                let metadata = GenerationMetadata {
                    model: self.llm.model_name().to_string(),
                    finish_reason: last_finish,
                    prompt_tokens: total_usage.prompt_tokens,
                    completion_tokens: total_usage.completion_tokens,
                    duration_ms: duration.as_millis() as u64,
                    tokens_per_second: if seconds > 0.0 {
                        total_usage.completion_tokens as f64 / seconds
                    } else {
                        0.0
                    },
                    turn_count: turn,
                };
                self.sessions
                    .set_debug_snapshot(
                        session_id,
                        DebugSnapshot {
                            context: serde_json::json!({
                                "recalledMemoryIds": recalled.memory_ids(),
                                "noteNames": recalled.note_names(),
                                "tags": recalled.tags,
                            }),
                            tool_traces: traces.clone(),
                            model: metadata.model.clone(),
                            turn_count: turn,
                        },
                    )
                    .await;
                let _ = tx
                    .send(ChatDelta::GenerationCompleted {
                        message: serde_json::to_value(&final_msg).unwrap_or(Value::Null),
                        metadata,
                    })
                    .await;
                return Ok(());
            }

            let mut assistant =
                ChatMessage::new(session_id, MessageRole::Assistant, clean_content.trim());
            if !parsed.thinking.is_empty() {
                assistant.think = Some(parsed.thinking);
            }
            assistant.tool_calls = calls
                .iter()
                .map(|c| ToolCallRecord {
                    id: c.id.clone(),
                    name: c.name.clone(),
                    arguments: serde_json::from_str(&c.arguments)
                        .unwrap_or_else(|_| Value::String(c.arguments.clone())),
                })
                .collect();
            store.save_message(&assistant).await?;

            let mut assistant_prompt = PromptMessage::assistant(&assistant.content);
            assistant_prompt.tool_calls = calls.clone();
            messages.push(assistant_prompt);

            let mut deferred = false;
            for call in &calls {
                if tx
                    .send(ChatDelta::ToolExecution {
                        call_id: call.id.clone(),
                        status: ToolExecutionStatus::Attempting {
                            name: call.name.clone(),
                            reference: call.name.clone(),
                        },
                    })
                    .await
                    .is_err()
                {
                    return Ok(());
                }

                let args: Value =
                    serde_json::from_str(&call.arguments).unwrap_or_else(|_| serde_json::json!({}));
                let outcome = match tools.iter().find(|t| t.id() == call.name) {
                    Some(tool) => {
                        let ctx = ToolCallContext::for_session(session_id);
                        tool.call(args.clone(), Some(&ctx)).await
                    }
                    None => Err(ToolError::NotFound(call.name.clone())),
                };

                match outcome {
                    Ok(out) => {
                        let _ = tx
                            .send(ChatDelta::ToolExecution {
                                call_id: call.id.clone(),
                                status: ToolExecutionStatus::Success {
                                    result: out.text.clone(),
                                },
                            })
                            .await;
                        store
                            .save_message(&ChatMessage::tool_reply(
                                session_id,
                                &call.id,
                                &out.text,
                            ))
                            .await?;
                        messages.push(PromptMessage::tool(&call.id, &out.text));
                        traces.push(ToolCallTrace {
                            call_id: call.id.clone(),
                            name: call.name.clone(),
                            arguments: args,
                            result: Some(out.text),
                            error: None,
                        });
                    }
                    Err(ToolError::ClientExecutionRequired) => {
                        deferred = true;
                        traces.push(ToolCallTrace {
                            call_id: call.id.clone(),
                            name: call.name.clone(),
                            arguments: args,
                            result: None,
                            error: None,
                        });
                    }
                    Err(e) => {
                        let error_text = format!("Error: {}", e);
                        let _ = tx
                            .send(ChatDelta::ToolExecution {
                                call_id: call.id.clone(),
                                status: ToolExecutionStatus::Failure {
                                    error: error_text.clone(),
                                },
                            })
                            .await;
                        let _ = tx
                            .send(ChatDelta::ToolCallError {
                                call_id: call.id.clone(),
                                name: call.name.clone(),
                                error: error_text.clone(),
                            })
                            .await;
                        store
                            .save_message(&ChatMessage::tool_reply(
                                session_id,
                                &call.id,
                                &error_text,
                            ))
                            .await?;
                        messages.push(PromptMessage::tool(&call.id, &error_text));
                        traces.push(ToolCallTrace {
                            call_id: call.id.clone(),
                            name: call.name.clone(),
                            arguments: args,
                            result: None,
                            error: Some(error_text),
                        });
                    }
                }
            }

            if deferred {
                // The assistant message stays unresolved; a follow-up turn
                // with tool outputs resumes the loop.
                self.sessions
                    .set_debug_snapshot(
                        session_id,
                        DebugSnapshot {
                            context: serde_json::json!({
                                "recalledMemoryIds": recalled.memory_ids(),
                                "noteNames": recalled.note_names(),
                                "tags": recalled.tags,
                            }),
                            tool_traces: traces.clone(),
                            model: self.llm.model_name().to_string(),
                            turn_count: turn,
                        },
                    )
                    .await;
                return Ok(());
            }
        }
    }

    async fn compress_and_rebuild(
        &self,
        session_id: &str,
        system_prompt: &str,
        attempts: u8,
    ) -> Result<Vec<PromptMessage>, EngineError> {
        let scope = if attempts == 0 {
            CompressionScope::Topic
        } else {
            CompressionScope::Broad
        };
        tracing::info!(session = %session_id, ?scope, "compressing context");
        let working = self.compressor.compress(session_id, scope).await?;
        let mut messages = vec![PromptMessage::system(system_prompt)];
        messages.extend(prompt::to_prompt_messages(&working));
        Ok(messages)
    }

    async fn pump_stream(
        &self,
        request: &ChatRequest,
        tx: &mpsc::Sender<ChatDelta>,
        parser: &mut StreamingParser,
    ) -> Result<PumpOutcome, EngineError> {
        let (chunk_tx, mut chunk_rx) = mpsc::channel(64);
        let (delta_tx, mut delta_rx) = mpsc::channel::<ToolCallDelta>(64);
        let llm = Arc::clone(&self.llm);
        let req = request.clone();
        let task =
            tokio::spawn(async move { llm.invoke_stream(&req, Some(chunk_tx), Some(delta_tx)).await });

        let mut accumulated: std::collections::BTreeMap<usize, ToolCall> =
            std::collections::BTreeMap::new();
        let mut thought_open = false;
        let mut chunks_done = false;
        let mut deltas_done = false;
        let mut cancelled = false;

        while !(chunks_done && deltas_done) {
            tokio::select! {
                maybe = chunk_rx.recv(), if !chunks_done => match maybe {
                    Some(chunk) => {
                        let parsed = parser.feed(&chunk.content);
                        if let Some(thinking) = parsed.thinking {
                            thought_open = true;
                            if tx.send(ChatDelta::Thought { content: thinking }).await.is_err() {
                                cancelled = true;
                                break;
                            }
                        }
                        if let Some(content) = parsed.content {
                            if thought_open {
                                if tx.send(ChatDelta::ThoughtCompleted).await.is_err() {
                                    cancelled = true;
                                    break;
                                }
                                thought_open = false;
                            }
                            if tx.send(ChatDelta::Delta { content }).await.is_err() {
                                cancelled = true;
                                break;
                            }
                        }
                    }
                    None => chunks_done = true,
                },
                maybe = delta_rx.recv(), if !deltas_done => match maybe {
                    Some(delta) => {
                        let entry = accumulated.entry(delta.index).or_default();
                        if let Some(id) = &delta.call_id {
                            if entry.id.is_empty() {
                                entry.id = id.clone();
                            }
                        }
                        if let Some(name) = &delta.name {
                            entry.name.push_str(name);
                        }
                        entry.arguments.push_str(&delta.arguments_delta);

                        let chunk = ToolCallChunk {
                            index: delta.index,
                            id: delta.call_id.unwrap_or_default(),
                            name: delta.name.unwrap_or_default(),
                            arguments: delta.arguments_delta,
                        };
                        if tx.send(ChatDelta::ToolCall { call: chunk }).await.is_err() {
                            cancelled = true;
                            break;
                        }
                    }
                    None => deltas_done = true,
                },
            }
        }

        if cancelled {
            // Stop consuming LLM tokens; nothing from this turn persists.
            task.abort();
            return Ok(PumpOutcome::Cancelled);
        }
        if thought_open {
            let _ = tx.send(ChatDelta::ThoughtCompleted).await;
        }

        let response = task
            .await
            .map_err(|e| EngineError::Llm(LlmError::Request(e.to_string())))??;
        Ok(PumpOutcome::Streamed(PumpedStream {
            response,
            accumulated: accumulated.into_values().collect(),
        }))
    }
}
