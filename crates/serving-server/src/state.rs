//! Application state and configuration.

use std::sync::Arc;

use serving_runtime::GenerationEngine;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// Shared engine for generation.
    pub engine: Arc<GenerationEngine>,
    /// Server configuration.
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(engine: Arc<GenerationEngine>, config: ServerConfig) -> Self {
        Self { engine, config }
    }
}

/// Server configuration parameters.
#[derive(Clone, Debug, Default)]
pub struct ServerConfig {
    /// Model used when a request omits `model_name`.
    pub default_model: Option<String>,
}
