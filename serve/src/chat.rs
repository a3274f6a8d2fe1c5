//! Chat routes: blocking turn and SSE streaming turn.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::Response;
use axum::Json;
use futures_util::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;

use chat_event::{to_sse_frame, ChatDelta};
use monad::engine::{ChatTurnRequest, ToolOutput};

use crate::{ApiError, AppState};

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChatBody {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_outputs: Vec<ToolOutputBody>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ToolOutputBody {
    tool_call_id: String,
    content: String,
}

fn to_request(body: ChatBody) -> ChatTurnRequest {
    ChatTurnRequest {
        content: body.content,
        tool_outputs: body
            .tool_outputs
            .into_iter()
            .map(|o| ToolOutput {
                tool_call_id: o.tool_call_id,
                content: o.content,
            })
            .collect(),
        system_preamble: None,
    }
}

/// Non-streaming turn: drains the delta stream and returns the final
/// message with metadata (or the error).
pub(crate) async fn chat(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ChatBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.store.get_session(&id).await?;
    let mut rx = state.engine.stream_turn(&id, to_request(body));

    let mut completed: Option<serde_json::Value> = None;
    let mut error: Option<String> = None;
    while let Some(delta) = rx.recv().await {
        match delta {
            ChatDelta::GenerationCompleted { message, metadata } => {
                completed = Some(serde_json::json!({
                    "message": message,
                    "metadata": metadata,
                }));
            }
            ChatDelta::Error { message } => error = Some(message),
            _ => {}
        }
    }
    if let Some(message) = error {
        return Err(ApiError::bad_request(message));
    }
    // Without a completed generation the turn deferred to client tools; the
    // caller fetches the unresolved assistant message from the transcript.
    Ok(Json(completed.unwrap_or(serde_json::json!({
        "status": "clientExecutionRequired"
    }))))
}

/// Streaming turn: each delta as one `data: <json>\n\n` SSE frame,
/// terminated by `stream_completed`.
pub(crate) async fn chat_stream(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ChatBody>,
) -> Result<Response, ApiError> {
    state.store.get_session(&id).await?;
    let rx = state.engine.stream_turn(&id, to_request(body));

    let frames = ReceiverStream::new(rx).map(|delta| {
        let frame = to_sse_frame(&delta)
            .unwrap_or_else(|_| "data: {\"type\":\"error\",\"message\":\"serialization\"}\n\n".into());
        Ok::<_, std::convert::Infallible>(frame)
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .body(Body::from_stream(frames))
        .map_err(|e| ApiError::internal(e.to_string()))
}
