//! Telemetry hooks for generation performance measurement.
//!
//! Provides:
//! - [`GenerationMetrics`]: TTFT, tokens/sec, and generation summary
//! - [`TelemetryHook`] trait: callback interface for real-time metric reporting
//! - [`InferenceTimer`]: records timestamps and computes metrics
//! - [`NoopTelemetry`] / [`LogTelemetry`] / [`TracingTelemetry`]: built-in hooks

use std::sync::{Arc, Mutex};
use std::time::Instant;

use serde::Serialize;

/// Aggregate metrics from one request.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationMetrics {
    /// Model that served the request.
    pub model: String,
    /// Time to first emitted token in milliseconds.
    pub ttft_ms: f64,
    /// Tokens emitted per second after the first one.
    pub tokens_per_sec: f64,
    /// Number of prompt tokens.
    pub prompt_tokens: usize,
    /// Number of tokens emitted to the caller.
    pub generated_tokens: usize,
    /// Total wall-clock time in milliseconds.
    pub total_time_ms: f64,
}

/// Callback trait for real-time generation telemetry.
///
/// All methods have default no-op implementations so hooks can be selective.
pub trait TelemetryHook: Send + Sync {
    /// Called when the first token is emitted.
    fn on_first_token(&self, _model: &str, _ttft_ms: f64) {}

    /// Called after each emitted token.
    fn on_token_generated(&self, _token_idx: usize, _elapsed_ms: f64) {}

    /// Called when a request finishes, successfully or not.
    fn on_generation_complete(&self, _metrics: &GenerationMetrics) {}
}

/// No-op telemetry hook: zero overhead when metrics aren't needed.
#[derive(Debug, Clone, Copy)]
pub struct NoopTelemetry;

impl TelemetryHook for NoopTelemetry {}

/// Collects the last completed report for later retrieval.
#[derive(Debug, Clone)]
pub struct LogTelemetry {
    last_report: Arc<Mutex<Option<GenerationMetrics>>>,
}

impl Default for LogTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl LogTelemetry {
    pub fn new() -> Self {
        Self {
            last_report: Arc::new(Mutex::new(None)),
        }
    }

    /// Retrieve the last completed request's metrics.
    pub fn last_metrics(&self) -> Option<GenerationMetrics> {
        self.last_report
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl TelemetryHook for LogTelemetry {
    fn on_generation_complete(&self, metrics: &GenerationMetrics) {
        *self.last_report.lock().unwrap_or_else(|e| e.into_inner()) = Some(metrics.clone());
    }
}

/// Emits metrics as `tracing` events. The engine default.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetryHook for TracingTelemetry {
    fn on_first_token(&self, model: &str, ttft_ms: f64) {
        tracing::trace!(model, ttft_ms, "first token");
    }

    fn on_generation_complete(&self, metrics: &GenerationMetrics) {
        tracing::debug!(
            model = %metrics.model,
            prompt_tokens = metrics.prompt_tokens,
            generated_tokens = metrics.generated_tokens,
            ttft_ms = metrics.ttft_ms,
            tokens_per_sec = metrics.tokens_per_sec,
            "generation complete"
        );
    }
}

/// Records timestamps during one request to compute [`GenerationMetrics`].
///
/// Usage:
/// 1. Call [`InferenceTimer::new`] when the request is admitted
/// 2. Call [`InferenceTimer::mark_token`] for each emitted token
/// 3. Call [`InferenceTimer::finish`] to compute final metrics
pub struct InferenceTimer {
    model: String,
    prompt_tokens: usize,
    start: Instant,
    first_token: Option<Instant>,
    token_count: usize,
    hook: Arc<dyn TelemetryHook>,
}

impl InferenceTimer {
    pub fn new(model: impl Into<String>, prompt_tokens: usize, hook: Arc<dyn TelemetryHook>) -> Self {
        Self {
            model: model.into(),
            prompt_tokens,
            start: Instant::now(),
            first_token: None,
            token_count: 0,
            hook,
        }
    }

    /// Mark a token emitted. The first call also fires `on_first_token`.
    pub fn mark_token(&mut self) {
        let now = Instant::now();
        if self.first_token.is_none() {
            self.first_token = Some(now);
            let ttft_ms = now.duration_since(self.start).as_secs_f64() * 1000.0;
            self.hook.on_first_token(&self.model, ttft_ms);
        }
        self.token_count += 1;
        let elapsed_ms = now.duration_since(self.start).as_secs_f64() * 1000.0;
        self.hook.on_token_generated(self.token_count, elapsed_ms);
    }

    pub fn token_count(&self) -> usize {
        self.token_count
    }

    /// Finalize and return metrics. Fires `on_generation_complete`.
    pub fn finish(self) -> GenerationMetrics {
        let total_time_ms = self.start.elapsed().as_secs_f64() * 1000.0;

        let ttft_ms = self
            .first_token
            .map(|t| t.duration_since(self.start).as_secs_f64() * 1000.0)
            .unwrap_or(0.0);

        let decode_time_ms = total_time_ms - ttft_ms;
        let tokens_per_sec = if decode_time_ms > 0.0 && self.token_count > 1 {
            (self.token_count - 1) as f64 / (decode_time_ms / 1000.0)
        } else {
            0.0
        };

        let metrics = GenerationMetrics {
            model: self.model,
            ttft_ms,
            tokens_per_sec,
            prompt_tokens: self.prompt_tokens,
            generated_tokens: self.token_count,
            total_time_ms,
        };

        self.hook.on_generation_complete(&metrics);
        metrics
    }
}
