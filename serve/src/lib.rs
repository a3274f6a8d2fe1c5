//! HTTP + WebSocket surface for the Monad core.
//!
//! Route handlers are thin adapters between requests and the core; all
//! behavior lives in the `monad` crate. The chat stream endpoint frames
//! [`chat_event::ChatDelta`] values as SSE; `/v1/connect` upgrades remote
//! clients into the connection manager.

pub mod app;
mod chat;
mod clients;
mod connection;
mod error;
mod jobs;
mod memories;
pub mod providers;
mod sessions;
mod status;
mod workspaces;

pub use app::{build_app, AppState};
pub use error::ApiError;
