//! HTTP error handling and response mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use serving_engine::{RetCode, ServingError, Status};

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("{0}")]
    Serving(#[from] ServingError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// The boundary status reported in the response body.
    pub fn status(&self) -> Status {
        match self {
            ServerError::Serving(e) => Status::from(e),
            ServerError::InvalidRequest(msg) => Status::new(RetCode::InvalidArgument, msg.clone()),
            ServerError::Internal(msg) => Status::new(RetCode::Internal, msg.clone()),
        }
    }
}

/// HTTP status for a result code.
pub fn http_status(code: RetCode) -> StatusCode {
    match code {
        RetCode::Success | RetCode::StopIteration => StatusCode::OK,
        RetCode::InvalidArgument => StatusCode::BAD_REQUEST,
        RetCode::NotFound => StatusCode::NOT_FOUND,
        RetCode::ResourceExhausted => StatusCode::SERVICE_UNAVAILABLE,
        RetCode::Cancelled => StatusCode::CONFLICT,
        RetCode::DeadlineExceeded => StatusCode::REQUEST_TIMEOUT,
        RetCode::Internal | RetCode::ModelLoad => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let http = http_status(status.code());
        if http.is_server_error() {
            tracing::error!(%status, "request failed");
        } else {
            tracing::debug!(%status, "request rejected");
        }
        (http, Json(json!({ "status": status }))).into_response()
    }
}
