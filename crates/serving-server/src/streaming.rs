//! Server-Sent Events (SSE) streaming for generation.
//!
//! Protocol:
//! - Each token is sent as `data: {"session_id": .., "token_id": ..}`
//! - The terminal status follows as `data: {"session_id": .., "status": {..}}`
//! - Final message is `data: [DONE]`
//!
//! Each pull runs on the blocking pool. If the client disconnects, axum drops
//! the stream and the session is cancelled, releasing its decode slot.

use std::convert::Infallible;

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;
use serde::Serialize;
use serving_engine::{RetCode, Status};
use serving_runtime::StreamingSession;

use crate::models::{StreamFinal, StreamToken};

/// Cancels the session when dropped. A session that already finished is
/// left as is.
struct CancelOnDrop(StreamingSession);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if self.0.cancel() {
            tracing::debug!(session_id = %self.0.id(), "stream dropped, session cancelled");
        }
    }
}

fn json_event<T: Serialize>(payload: &T) -> Event {
    Event::default()
        .json_data(payload)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

/// Create an SSE stream that drains `session`.
pub fn stream_generation(
    session: StreamingSession,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let session_id = session.id();
    let guard = CancelOnDrop(session.clone());

    let stream = async_stream::stream! {
        let _guard = guard;

        loop {
            let pulling = session.clone();
            let (status, token) = match tokio::task::spawn_blocking(move || pulling.pull()).await {
                Ok(pulled) => pulled,
                Err(e) => (
                    Status::new(RetCode::Internal, format!("decode task failed: {e}")),
                    None,
                ),
            };

            if let Some(token_id) = token {
                yield Ok(json_event(&StreamToken { session_id, token_id }));
                continue;
            }

            let terminal = StreamFinal {
                session_id,
                status,
                finish_reason: session.finish_reason(),
            };
            yield Ok(json_event(&terminal));
            yield Ok(Event::default().data("[DONE]"));
            break;
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}
