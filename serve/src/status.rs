//! Health/status route.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::AppState;

/// `GET /status`: overall status with per-component health.
pub(crate) async fn status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let database_ok = state.store.health_check().await;
    let provider = state.provider_status;
    let overall = if database_ok { "ok" } else { "down" };

    Json(serde_json::json!({
        "status": overall,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": state.started_at.elapsed().as_secs(),
        "components": {
            "database": {"status": if database_ok { "ok" } else { "down" }},
            "ai_provider": {"status": provider},
        }
    }))
}
