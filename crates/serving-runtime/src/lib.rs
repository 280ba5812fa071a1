//! # serving-runtime
//!
//! Request lifecycle for the serving stack. [`GenerationEngine`] owns loaded
//! models and a fixed pool of decode slots and exposes two entry points:
//!
//! - [`GenerationEngine::generate`] decodes to completion on the calling thread.
//! - [`GenerationEngine::generate_streaming`] returns a [`StreamingSession`]
//!   that decodes one token per [`StreamingSession::pull`].
//!
//! [`ResultIterator`] adapts a session to plain iteration. Sessions nobody
//! pulls are evicted by a background reaper thread.

mod backends;
mod config;
mod decode;
mod engine;
mod iterator;
mod loader;
mod reaper;
mod session;
mod slots;
mod telemetry;

pub use backends::{ScriptedModel, SyntheticModel};
pub use config::{BeamOutput, EngineConfig};
pub use decode::FinishReason;
pub use engine::{GenerationEngine, GenerationOutput};
pub use iterator::{IterResult, ResultIterator};
pub use loader::{
    build_backend, load_engine_config, load_model, load_models, BackendConfig, ModelConfigFile,
    ENGINE_CONFIG_FILE, MODEL_CONFIG_FILE,
};
pub use session::{SessionState, StreamingSession};
pub use slots::{SlotGuard, SlotPool};
pub use telemetry::{
    GenerationMetrics, InferenceTimer, LogTelemetry, NoopTelemetry, TelemetryHook,
    TracingTelemetry,
};

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
