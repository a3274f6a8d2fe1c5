//! Chat delta protocol: the wire shape of one chat stream event.
//!
//! This crate defines the event union emitted by the chat engine during one
//! user turn plus the `data: <json>\n\n` SSE framing used by the HTTP stream
//! endpoint. It does not depend on the core crate; the core emits [`ChatDelta`]
//! values and `serve` frames them.

pub mod event;
pub mod sse;

pub use event::{
    ChatDelta, ContextMetadata, GenerationMetadata, ToolCallChunk, ToolExecutionStatus,
};
pub use sse::to_sse_frame;
