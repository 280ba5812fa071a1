//! Health check handler.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::state::AppState;

/// Handle health check requests. Includes slot utilization stats.
pub async fn handle_health(State(state): State<AppState>) -> Json<Value> {
    let engine = &state.engine;
    Json(json!({
        "status": if engine.is_shut_down() { "shutting_down" } else { "ok" },
        "models": engine.model_count(),
        "sessions": {
            "active": engine.active_sessions(),
            "max_concurrent": engine.config().max_concurrent_requests,
            "available": engine.available_slots(),
        }
    }))
}
