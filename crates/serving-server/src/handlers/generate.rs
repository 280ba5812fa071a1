//! Generation handler.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serving_engine::Status;

use crate::{
    error::ServerError,
    models::{GenerateRequest, GenerateResponse, Usage},
    state::AppState,
    streaming,
};

/// Response header carrying the id of a streaming session.
pub const SESSION_ID_HEADER: HeaderName = HeaderName::from_static("x-session-id");

/// Handle generation requests (streaming and blocking).
///
/// Admission errors are reported before any bytes are streamed, so a
/// streaming request that cannot start still gets a plain error response.
pub async fn handle_generate(
    State(state): State<AppState>,
    Json(req): Json<GenerateRequest>,
) -> Result<Response, ServerError> {
    let model = req
        .model_name
        .or_else(|| state.config.default_model.clone())
        .ok_or_else(|| ServerError::InvalidRequest("model_name is required".into()))?;
    let config = req.generation_config.sampling_config();

    if req.stream {
        let session = state
            .engine
            .generate_streaming(&model, &req.input_tokens, config)?;
        let session_id = HeaderValue::from_str(&session.id().to_string())
            .map_err(|e| ServerError::Internal(e.to_string()))?;
        tracing::debug!(session_id = ?session_id, %model, "streaming generation started");

        let mut response = streaming::stream_generation(session).into_response();
        response.headers_mut().insert(SESSION_ID_HEADER, session_id);
        return Ok(response);
    }

    let engine = Arc::clone(&state.engine);
    let prompt = req.input_tokens;
    let model_name = model.clone();
    let output = tokio::task::spawn_blocking(move || engine.generate(&model_name, &prompt, config))
        .await
        .map_err(|e| ServerError::Internal(format!("generation task failed: {e}")))??;

    let completion_tokens = output.tokens().len();
    Ok(Json(GenerateResponse {
        id: output.request_id,
        created: Utc::now().timestamp(),
        model,
        status: Status::ok(),
        usage: Usage::new(output.prompt_tokens, completion_tokens),
        finish_reason: output.finish_reason,
        output_tokens: output.sequences,
    })
    .into_response())
}
