use crate::status::RetCode;

pub type Result<T> = std::result::Result<T, ServingError>;

/// Top-level error type for all engine operations.
///
/// Normal end of a stream is not an error; it is reported as
/// [`RetCode::StopIteration`] through [`crate::Status`].
#[derive(Debug, thiserror::Error)]
pub enum ServingError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("deadline exceeded: {0}")]
    DeadlineExceeded(String),

    #[error("model load failed: {0}")]
    ModelLoad(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServingError {
    /// The result code this error is reported under at the boundary.
    pub fn code(&self) -> RetCode {
        match self {
            ServingError::InvalidArgument(_) => RetCode::InvalidArgument,
            ServingError::NotFound(_) => RetCode::NotFound,
            ServingError::ResourceExhausted(_) => RetCode::ResourceExhausted,
            ServingError::Internal(_) => RetCode::Internal,
            ServingError::Cancelled(_) => RetCode::Cancelled,
            ServingError::DeadlineExceeded(_) => RetCode::DeadlineExceeded,
            ServingError::ModelLoad(_) | ServingError::Io(_) | ServingError::Json(_) => {
                RetCode::ModelLoad
            }
        }
    }

    /// Human-readable message without the variant prefix.
    pub fn message(&self) -> String {
        match self {
            ServingError::InvalidArgument(msg)
            | ServingError::NotFound(msg)
            | ServingError::ResourceExhausted(msg)
            | ServingError::Internal(msg)
            | ServingError::Cancelled(msg)
            | ServingError::DeadlineExceeded(msg)
            | ServingError::ModelLoad(msg) => msg.clone(),
            ServingError::Io(e) => e.to_string(),
            ServingError::Json(e) => e.to_string(),
        }
    }

    /// Rebuild an error from a failing status code.
    ///
    /// Returns `None` for `Success` and `StopIteration`, which are not errors.
    pub fn from_code(code: RetCode, message: impl Into<String>) -> Option<Self> {
        let message = message.into();
        let err = match code {
            RetCode::Success | RetCode::StopIteration => return None,
            RetCode::InvalidArgument => ServingError::InvalidArgument(message),
            RetCode::NotFound => ServingError::NotFound(message),
            RetCode::ResourceExhausted => ServingError::ResourceExhausted(message),
            RetCode::Internal => ServingError::Internal(message),
            RetCode::Cancelled => ServingError::Cancelled(message),
            RetCode::DeadlineExceeded => ServingError::DeadlineExceeded(message),
            RetCode::ModelLoad => ServingError::ModelLoad(message),
        };
        Some(err)
    }
}
