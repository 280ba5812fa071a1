//! # serving-server
//!
//! HTTP endpoint for the serving engine.
//!
//! Exposes blocking and streaming generation, session cancellation, the model
//! list and a health probe. Streaming responses use Server-Sent Events (SSE):
//! one event per token, a final status event, then `[DONE]`.

pub mod error;
pub mod handlers;
pub mod models;
pub mod server;
pub mod state;
pub mod streaming;

pub use error::ServerError;
pub use server::{create_router, run_server};
pub use state::{AppState, ServerConfig};
