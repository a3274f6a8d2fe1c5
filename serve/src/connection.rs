//! WebSocket endpoint for remote clients: `GET /v1/connect`.
//!
//! The `x-monad-client-id` header identifies the caller. Text frames are
//! JSON and go to the connection manager for response correlation; binary
//! frames are ignored.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::Response;
use tokio::sync::mpsc;

use crate::{ApiError, AppState};

const CLIENT_ID_HEADER: &str = "x-monad-client-id";

pub(crate) async fn connect(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let client_id = headers
        .get(CLIENT_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .ok_or_else(|| ApiError::bad_request(format!("missing {} header", CLIENT_ID_HEADER)))?;
    uuid::Uuid::parse_str(&client_id)
        .map_err(|_| ApiError::bad_request(format!("{} must be a uuid", CLIENT_ID_HEADER)))?;

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, client_id, state)))
}

async fn handle_socket(mut socket: WebSocket, client_id: String, state: Arc<AppState>) {
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(64);
    state.connections.register(&client_id, outbound_tx);
    if let Err(e) = state.store.touch_client(&client_id).await {
        tracing::debug!(client = %client_id, error = %e, "last-seen update failed");
    }

    loop {
        tokio::select! {
            outbound = outbound_rx.recv() => match outbound {
                Some(frame) => {
                    if socket.send(Message::Text(frame)).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
            inbound = socket.recv() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    state.connections.handle_frame(&text);
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {
                    // Binary, ping, pong: ignored. The transport handles
                    // keepalive itself.
                }
                Some(Err(e)) => {
                    tracing::warn!(client = %client_id, error = %e, "socket read error");
                    break;
                }
            },
        }
    }

    state.connections.unregister(&client_id);
}
