//! Boundary result codes.
//!
//! Every engine call is reported to callers as a [`Status`] next to its
//! payload. Callers check the status before touching the payload.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ServingError;

/// Result code carried by a [`Status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RetCode {
    #[serde(rename = "RET_SUCCESS")]
    Success = 0,
    #[serde(rename = "RET_STOP_ITERATION")]
    StopIteration = 1,
    #[serde(rename = "RET_INVALID_ARGUMENT")]
    InvalidArgument = 2,
    #[serde(rename = "RET_NOT_FOUND")]
    NotFound = 3,
    #[serde(rename = "RET_RESOURCE_EXHAUSTED")]
    ResourceExhausted = 4,
    #[serde(rename = "RET_INTERNAL")]
    Internal = 5,
    #[serde(rename = "RET_CANCELLED")]
    Cancelled = 6,
    #[serde(rename = "RET_DEADLINE_EXCEEDED")]
    DeadlineExceeded = 7,
    #[serde(rename = "RET_MODEL_LOAD")]
    ModelLoad = 8,
}

impl RetCode {
    pub fn as_str(self) -> &'static str {
        match self {
            RetCode::Success => "RET_SUCCESS",
            RetCode::StopIteration => "RET_STOP_ITERATION",
            RetCode::InvalidArgument => "RET_INVALID_ARGUMENT",
            RetCode::NotFound => "RET_NOT_FOUND",
            RetCode::ResourceExhausted => "RET_RESOURCE_EXHAUSTED",
            RetCode::Internal => "RET_INTERNAL",
            RetCode::Cancelled => "RET_CANCELLED",
            RetCode::DeadlineExceeded => "RET_DEADLINE_EXCEEDED",
            RetCode::ModelLoad => "RET_MODEL_LOAD",
        }
    }

    /// Numeric form used by process exit codes and FFI callers.
    pub fn as_i32(self) -> i32 {
        self as i32
    }
}

impl fmt::Display for RetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A result code plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: RetCode,
    pub message: String,
}

impl Status {
    pub fn new(code: RetCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn ok() -> Self {
        Self::new(RetCode::Success, "")
    }

    /// Normal end of a stream.
    pub fn stop_iteration() -> Self {
        Self::new(RetCode::StopIteration, "iteration finished")
    }

    pub fn is_ok(&self) -> bool {
        self.code == RetCode::Success
    }

    pub fn is_stop_iteration(&self) -> bool {
        self.code == RetCode::StopIteration
    }

    /// True for every code other than `Success` and `StopIteration`.
    pub fn is_error(&self) -> bool {
        !self.is_ok() && !self.is_stop_iteration()
    }

    pub fn code(&self) -> RetCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The error this status encodes, if any.
    pub fn to_error(&self) -> Option<ServingError> {
        ServingError::from_code(self.code, self.message.clone())
    }

    /// Boundary encoding of a result: `Success` or the error's code.
    pub fn from_result<T>(result: &crate::Result<T>) -> Self {
        match result {
            Ok(_) => Self::ok(),
            Err(e) => Self::from(e),
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

impl From<&ServingError> for Status {
    fn from(err: &ServingError) -> Self {
        Status::new(err.code(), err.message())
    }
}

impl From<ServingError> for Status {
    fn from(err: ServingError) -> Self {
        Status::from(&err)
    }
}
