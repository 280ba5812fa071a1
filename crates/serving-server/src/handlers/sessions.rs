//! Streaming session handlers.

use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use serving_engine::{ServingError, Status};
use uuid::Uuid;

use crate::{error::ServerError, state::AppState};

fn parse_session_id(raw: &str) -> Result<Uuid, ServerError> {
    Uuid::parse_str(raw)
        .map_err(|e| ServerError::InvalidRequest(format!("invalid session id {raw}: {e}")))
}

/// Report a running session. Finished sessions are no longer tracked.
pub async fn handle_session_status(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Value>, ServerError> {
    let id = parse_session_id(&raw_id)?;
    let session = state
        .engine
        .session(&id)
        .ok_or_else(|| ServingError::NotFound(format!("session {id}")))?;
    Ok(Json(json!({
        "session_id": id,
        "model": session.model(),
        "state": session.state(),
    })))
}

/// Cancel a running session. Its stream ends with `RET_CANCELLED`.
pub async fn handle_cancel_session(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<Value>, ServerError> {
    let id = parse_session_id(&raw_id)?;
    state.engine.cancel(&id)?;
    tracing::info!(session_id = %id, "session cancelled by client");
    Ok(Json(json!({
        "session_id": id,
        "status": Status::ok(),
    })))
}
