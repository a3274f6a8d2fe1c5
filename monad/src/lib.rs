//! # Monad core
//!
//! Server-side core of the Monad assistant platform: long-running sessions
//! driving multi-turn LLM dialogues with tools, memory recall, an embedded
//! relational store, and background jobs.
//!
//! ## Main modules
//!
//! - [`store`]: embedded SQLite persistence — migrations, archive
//!   immutability triggers, memory similarity/tag search, raw SQL, and the
//!   job event stream ([`Store`]).
//! - [`parser`]: streaming `<think>`/content classifier and tool-call
//!   extraction ([`StreamingParser`]).
//! - [`context`]: RAG pipeline — tags, embeddings, hybrid search, tag boost
//!   and time decay re-ranking, reinforcement ([`ContextManager`]).
//! - [`tools`]: tool trait, registry, system tools, and the dispatcher
//!   routing calls to server workspaces or remote clients ([`ToolDispatcher`]).
//! - [`workspace`]: URI-addressed file roots with jail enforcement
//!   ([`WorkspaceStore`], [`WorkspaceUri`]).
//! - [`session`]: session lifecycle and per-session component graphs
//!   ([`SessionManager`]).
//! - [`engine`]: the ReAct chat loop emitting [`chat_event::ChatDelta`]
//!   streams, with context compression fallback ([`ChatEngine`]).
//! - [`jobs`]: job runner (event-driven + periodic scan) and agents
//!   ([`JobRunner`]).
//! - [`client`]: request/response correlation to remote clients
//!   ([`ClientConnectionManager`]).
//!
//! Key types are re-exported at the crate root:
//! `use monad::{Store, SessionManager, ChatEngine};`.

pub mod client;
pub mod context;
pub mod engine;
pub mod jobs;
pub mod llm;
pub mod model;
pub mod parser;
pub mod session;
pub mod store;
pub mod tools;
pub mod workspace;

pub use client::{ClientConnectionManager, ConnectionError, CLIENT_RPC_TIMEOUT};
pub use context::{ContextError, ContextManager, ContextProgress, Embedder, RecalledContext};
pub use engine::{ChatEngine, ChatTurnRequest, EngineError, ToolOutput, MAX_TURNS};
pub use jobs::{AgentRegistry, JobAgent, JobRunner};
pub use llm::{ChatRequest, LlmClient, LlmError, LlmResponse, LlmUsage, MockLlm};
pub use model::{
    AgentProfile, ChatMessage, ClientIdentity, Job, JobStatus, Memory, MessageRole, Session,
    SummaryType, WorkspaceRecord,
};
pub use parser::{extract_tool_calls, ParsedChunk, ParsedMessage, StreamingParser};
pub use session::{DebugSnapshot, SessionError, SessionManager};
pub use store::{JobEvent, SimilarityPolicy, SqlOutcome, Store, StoreError};
pub use tools::{Tool, ToolDispatcher, ToolError, ToolRegistry, ToolSpec};
pub use workspace::{Workspace, WorkspaceError, WorkspaceStore, WorkspaceUri};
