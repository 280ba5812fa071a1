//! Consumer-side iteration over a streaming session.

use serving_engine::{RetCode, ServingError, Status, TokenId};

use crate::session::StreamingSession;

/// Outcome of one [`ResultIterator::next_result`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum IterResult {
    Value(TokenId),
    /// Generation finished normally.
    Done,
    Error(Status),
}

/// Turns session pulls into produce-next-or-signal-done iteration.
///
/// Dropping the iterator does not stop the session; cancel it through the
/// engine or let the idle reaper reclaim it.
#[derive(Debug)]
pub struct ResultIterator {
    session: StreamingSession,
    fused: bool,
}

impl ResultIterator {
    pub fn new(session: StreamingSession) -> Self {
        Self {
            session,
            fused: false,
        }
    }

    pub fn session(&self) -> &StreamingSession {
        &self.session
    }

    /// Pull once and classify the result. Terminal results repeat.
    pub fn next_result(&mut self) -> IterResult {
        match self.session.pull() {
            (status, Some(token)) if status.is_ok() => IterResult::Value(token),
            (status, _) if status.is_stop_iteration() => IterResult::Done,
            (status, _) if status.is_ok() => IterResult::Error(Status::new(
                RetCode::Internal,
                "session reported success without a token",
            )),
            (status, _) => IterResult::Error(status),
        }
    }
}

impl From<StreamingSession> for ResultIterator {
    fn from(session: StreamingSession) -> Self {
        Self::new(session)
    }
}

impl Iterator for ResultIterator {
    type Item = Result<TokenId, ServingError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fused {
            return None;
        }
        match self.next_result() {
            IterResult::Value(token) => Some(Ok(token)),
            IterResult::Done => {
                self.fused = true;
                None
            }
            IterResult::Error(status) => {
                self.fused = true;
                let err = status
                    .to_error()
                    .unwrap_or_else(|| ServingError::Internal(status.message().to_string()));
                Some(Err(err))
            }
        }
    }
}
