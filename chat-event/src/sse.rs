//! SSE framing for the chat stream endpoint: each event is one
//! `data: <ChatDelta JSON>\n\n` frame, terminated by `stream_completed`.

use crate::event::ChatDelta;

/// Serializes a delta into one SSE frame.
pub fn to_sse_frame(event: &ChatDelta) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(event)?;
    Ok(format!("data: {}\n\n", json))
}
