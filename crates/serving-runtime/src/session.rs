//! Streaming sessions.
//!
//! A [`StreamingSession`] is a cheap handle onto engine-owned decoding state.
//! All work happens inside [`StreamingSession::pull`]; nothing decodes in the
//! background. Once a session reaches `Done` or `Failed` its decode slot and
//! state are released and it leaves the engine's session table, but handles
//! keep answering with the terminal status.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::{Duration, Instant};

use serde::Serialize;
use serving_engine::{RetCode, Status, TokenId};
use tracing::debug;
use uuid::Uuid;

use crate::decode::{DecodeState, FinishReason};
use crate::lock;
use crate::slots::SlotGuard;
use crate::telemetry::InferenceTimer;

/// Lifecycle of a streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Running,
    /// Terminal: decoding ended naturally.
    Done,
    /// Terminal: backend error, cancellation or idle eviction.
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SessionState::Running)
    }
}

struct SessionInner {
    state: SessionState,
    terminal: Option<Status>,
    decode: Option<DecodeState>,
    finish_reason: Option<FinishReason>,
    slot: Option<SlotGuard>,
    timer: Option<InferenceTimer>,
    last_active: Instant,
}

impl SessionInner {
    /// Enter a terminal state and drop everything the session held.
    fn close(&mut self, id: Uuid, state: SessionState, status: Status) {
        self.finish_reason = self.decode.as_ref().and_then(DecodeState::finish_reason);
        self.state = state;
        self.decode = None;
        self.slot = None;
        if let Some(timer) = self.timer.take() {
            timer.finish();
        }
        debug!(session_id = %id, ?state, code = %status.code(), "session closed");
        self.terminal = Some(status);
    }
}

struct SessionShared {
    id: Uuid,
    model: String,
    inner: Mutex<SessionInner>,
    table: Weak<SessionTable>,
}

/// Handle to one in-progress streaming generation.
#[derive(Clone)]
pub struct StreamingSession(Arc<SessionShared>);

impl StreamingSession {
    pub(crate) fn new(
        id: Uuid,
        model: impl Into<String>,
        decode: DecodeState,
        slot: SlotGuard,
        timer: InferenceTimer,
        table: &Arc<SessionTable>,
    ) -> Self {
        Self(Arc::new(SessionShared {
            id,
            model: model.into(),
            inner: Mutex::new(SessionInner {
                state: SessionState::Running,
                terminal: None,
                decode: Some(decode),
                finish_reason: None,
                slot: Some(slot),
                timer: Some(timer),
                last_active: Instant::now(),
            }),
            table: Arc::downgrade(table),
        }))
    }

    pub fn id(&self) -> Uuid {
        self.0.id
    }

    pub fn model(&self) -> &str {
        &self.0.model
    }

    pub fn state(&self) -> SessionState {
        lock(&self.0.inner).state
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Why decoding ended, once the session is `Done`.
    pub fn finish_reason(&self) -> Option<FinishReason> {
        lock(&self.0.inner).finish_reason
    }

    /// Produce the next token or the terminal status.
    ///
    /// - `(Success, Some(token))` while running.
    /// - `(StopIteration, None)` once decoding ends naturally.
    /// - `(error, None)` after a backend failure, cancellation or eviction.
    ///
    /// Pulling a terminal session returns the same status again.
    pub fn pull(&self) -> (Status, Option<TokenId>) {
        let status = {
            let mut guard = lock(&self.0.inner);
            let inner = &mut *guard;
            if let Some(status) = &inner.terminal {
                return (status.clone(), None);
            }
            inner.last_active = Instant::now();

            let step = match inner.decode.as_mut() {
                Some(decode) => decode.next_token(),
                None => Err(serving_engine::ServingError::Internal(
                    "session lost its decoding state".into(),
                )),
            };

            match step {
                Ok(Some(token)) => {
                    if let Some(timer) = inner.timer.as_mut() {
                        timer.mark_token();
                    }
                    return (Status::ok(), Some(token));
                }
                Ok(None) => {
                    let status = Status::stop_iteration();
                    inner.close(self.0.id, SessionState::Done, status.clone());
                    status
                }
                Err(e) => {
                    let status = Status::from(&e);
                    inner.close(self.0.id, SessionState::Failed, status.clone());
                    status
                }
            }
        };
        self.unregister();
        (status, None)
    }

    /// Stop a running session. Returns `false` if it had already terminated.
    pub fn cancel(&self) -> bool {
        self.terminate(Status::new(RetCode::Cancelled, "session cancelled"))
    }

    /// Evict the session if it has not been pulled within `timeout`.
    ///
    /// A session busy in `pull` is not idle and is left alone.
    pub(crate) fn evict_if_idle(&self, timeout: Duration) -> bool {
        let evicted = {
            let Ok(mut inner) = self.0.inner.try_lock() else {
                return false;
            };
            if inner.terminal.is_some() || inner.last_active.elapsed() < timeout {
                false
            } else {
                let status = Status::new(
                    RetCode::DeadlineExceeded,
                    format!("session idle for more than {} ms", timeout.as_millis()),
                );
                inner.close(self.0.id, SessionState::Failed, status);
                true
            }
        };
        if evicted {
            self.unregister();
        }
        evicted
    }

    fn terminate(&self, status: Status) -> bool {
        {
            let mut inner = lock(&self.0.inner);
            if inner.terminal.is_some() {
                return false;
            }
            inner.close(self.0.id, SessionState::Failed, status);
        }
        self.unregister();
        true
    }

    fn unregister(&self) {
        if let Some(table) = self.0.table.upgrade() {
            table.remove(&self.0.id);
        }
    }
}

impl fmt::Debug for StreamingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingSession")
            .field("id", &self.0.id)
            .field("model", &self.0.model)
            .finish()
    }
}

/// Running sessions by id.
#[derive(Default)]
pub(crate) struct SessionTable {
    sessions: Mutex<HashMap<Uuid, StreamingSession>>,
}

impl SessionTable {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn insert(&self, session: StreamingSession) {
        lock(&self.sessions).insert(session.id(), session);
    }

    pub(crate) fn get(&self, id: &Uuid) -> Option<StreamingSession> {
        lock(&self.sessions).get(id).cloned()
    }

    pub(crate) fn remove(&self, id: &Uuid) -> Option<StreamingSession> {
        lock(&self.sessions).remove(id)
    }

    pub(crate) fn len(&self) -> usize {
        lock(&self.sessions).len()
    }

    /// Copy of the current handles, so callers can act on sessions without
    /// holding the table lock.
    pub(crate) fn snapshot(&self) -> Vec<StreamingSession> {
        lock(&self.sessions).values().cloned().collect()
    }
}
