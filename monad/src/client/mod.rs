//! Client connection manager: request/response correlation over persistent
//! bidirectional channels.
//!
//! The transport (WebSocket) lives in the serve layer; this manager only
//! sees outbound text frames per client and inbound frames fed through
//! [`ClientConnectionManager::handle_frame`]. Requests are JSON-RPC-shaped
//! and correlated by id; a waiter that is not answered within the timeout
//! resolves with `ConnectionFailed` and frees its slot.

use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

/// Default time to wait for a client response.
pub const CLIENT_RPC_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("client {0} is not connected")]
    NotConnected(String),
    #[error("connection failed: {0}")]
    ConnectionFailed(String),
}

type PendingSlot = oneshot::Sender<Result<Value, ConnectionError>>;

/// Correlates outbound requests with inbound responses per client.
pub struct ClientConnectionManager {
    writers: DashMap<String, mpsc::Sender<String>>,
    pending: DashMap<String, PendingSlot>,
    timeout: Duration,
}

impl Default for ClientConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConnectionManager {
    pub fn new() -> Self {
        Self::with_timeout(CLIENT_RPC_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            writers: DashMap::new(),
            pending: DashMap::new(),
            timeout,
        }
    }

    /// Registers the outbound writer for a client. A reconnect replaces the
    /// previous writer.
    pub fn register(&self, client_id: &str, writer: mpsc::Sender<String>) {
        self.writers.insert(client_id.to_string(), writer);
        tracing::info!(client = client_id, "client connected");
    }

    /// Drops a client's writer. In-flight requests to it time out.
    pub fn unregister(&self, client_id: &str) {
        self.writers.remove(client_id);
        tracing::info!(client = client_id, "client disconnected");
    }

    /// O(1) connectivity check.
    pub fn is_connected(&self, client_id: &str) -> bool {
        self.writers.contains_key(client_id)
    }

    /// Sends a request frame to `to` and awaits the correlated response.
    pub async fn send(
        &self,
        method: &str,
        params: Value,
        to: &str,
    ) -> Result<Value, ConnectionError> {
        let writer = self
            .writers
            .get(to)
            .map(|w| w.value().clone())
            .ok_or_else(|| ConnectionError::NotConnected(to.to_string()))?;

        let request_id = uuid::Uuid::new_v4().to_string();
        let frame = serde_json::json!({
            "jsonrpc": "2.0",
            "id": request_id,
            "method": method,
            "params": params,
        });

        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id.clone(), tx);

        if writer.send(frame.to_string()).await.is_err() {
            self.pending.remove(&request_id);
            return Err(ConnectionError::ConnectionFailed(format!(
                "write to client {} failed",
                to
            )));
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                self.pending.remove(&request_id);
                Err(ConnectionError::ConnectionFailed(
                    "response channel dropped".to_string(),
                ))
            }
            Err(_) => {
                self.pending.remove(&request_id);
                Err(ConnectionError::ConnectionFailed(format!(
                    "client {} did not answer within {:?}",
                    to, self.timeout
                )))
            }
        }
    }

    /// Classifies one inbound frame. Responses resolve their waiter; unknown
    /// frames are ignored.
    pub fn handle_frame(&self, text: &str) {
        let value: Value = match serde_json::from_str(text) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring unparseable frame");
                return;
            }
        };
        let Some(id) = value.get("id").and_then(|v| v.as_str()) else {
            return;
        };
        let Some((_, slot)) = self.pending.remove(id) else {
            return;
        };
        if let Some(error) = value.get("error") {
            let _ = slot.send(Err(ConnectionError::ConnectionFailed(error.to_string())));
        } else {
            let result = value.get("result").cloned().unwrap_or(Value::Null);
            let _ = slot.send(Ok(result));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: A request is answered when the matching response frame
    /// arrives.
    #[tokio::test]
    async fn request_response_correlation() {
        let manager = std::sync::Arc::new(ClientConnectionManager::new());
        let (tx, mut rx) = mpsc::channel::<String>(4);
        manager.register("c1", tx);
        assert!(manager.is_connected("c1"));

        let mgr = manager.clone();
        let echo = tokio::spawn(async move {
            let frame = rx.recv().await.unwrap();
            let request: Value = serde_json::from_str(&frame).unwrap();
            assert_eq!(request["method"], "read_file");
            let response = serde_json::json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "result": {"text": "ok"},
            });
            mgr.handle_frame(&response.to_string());
        });

        let result = manager
            .send("read_file", serde_json::json!({"path": "a"}), "c1")
            .await
            .unwrap();
        assert_eq!(result["text"], "ok");
        echo.await.unwrap();
    }

    /// **Scenario**: Sending to an unknown client fails without waiting.
    #[tokio::test]
    async fn unknown_client_fails_fast() {
        let manager = ClientConnectionManager::new();
        let err = manager
            .send("ping", Value::Null, "ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectionError::NotConnected(_)));
    }

    /// **Scenario**: No response within the timeout resolves the waiter with
    /// ConnectionFailed and frees the slot.
    #[tokio::test]
    async fn timeout_frees_slot() {
        let manager = ClientConnectionManager::with_timeout(Duration::from_millis(20));
        let (tx, _rx) = mpsc::channel::<String>(4);
        manager.register("c1", tx);

        let err = manager.send("slow", Value::Null, "c1").await.unwrap_err();
        assert!(matches!(err, ConnectionError::ConnectionFailed(_)));
        assert!(manager.pending.is_empty());
    }

    /// **Scenario**: Frames without a known id are ignored.
    #[tokio::test]
    async fn unknown_frames_ignored() {
        let manager = ClientConnectionManager::new();
        manager.handle_frame("not json");
        manager.handle_frame("{\"jsonrpc\":\"2.0\",\"id\":\"nobody\",\"result\":1}");
        manager.handle_frame("{\"hello\":\"world\"}");
    }

    /// **Scenario**: An error response surfaces as ConnectionFailed.
    #[tokio::test]
    async fn error_response_surfaces() {
        let manager = std::sync::Arc::new(ClientConnectionManager::new());
        let (tx, mut rx) = mpsc::channel::<String>(4);
        manager.register("c1", tx);

        let mgr = manager.clone();
        tokio::spawn(async move {
            let frame = rx.recv().await.unwrap();
            let request: Value = serde_json::from_str(&frame).unwrap();
            let response = serde_json::json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "error": {"code": -1, "message": "tool blew up"},
            });
            mgr.handle_frame(&response.to_string());
        });

        let err = manager.send("boom", Value::Null, "c1").await.unwrap_err();
        assert!(matches!(err, ConnectionError::ConnectionFailed(_)));
    }
}
