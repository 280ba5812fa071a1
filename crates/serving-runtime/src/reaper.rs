//! Idle session reaper.
//!
//! A dedicated thread wakes every `reaper_interval`, snapshots the session
//! table and evicts sessions nobody has pulled within the idle timeout.
//! Dropping the [`Reaper`] stops and joins the thread.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use serving_engine::{Result, ServingError};
use tracing::{debug, warn};

use crate::session::SessionTable;

pub(crate) struct Reaper {
    stop_tx: Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Reaper {
    pub(crate) fn spawn(
        sessions: Arc<SessionTable>,
        idle_timeout: Duration,
        interval: Duration,
    ) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let thread = thread::Builder::new()
            .name("session-reaper".into())
            .spawn(move || loop {
                match stop_rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => sweep(&sessions, idle_timeout),
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| ServingError::Internal(format!("failed to spawn session reaper: {e}")))?;

        debug!(?idle_timeout, ?interval, "session reaper started");
        Ok(Self {
            stop_tx,
            thread: Some(thread),
        })
    }

    pub(crate) fn stop(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("session reaper panicked");
            }
        }
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        self.stop();
    }
}

fn sweep(sessions: &SessionTable, idle_timeout: Duration) {
    for session in sessions.snapshot() {
        if session.evict_if_idle(idle_timeout) {
            warn!(
                session_id = %session.id(),
                model = session.model(),
                "evicted idle streaming session"
            );
        }
    }
}
