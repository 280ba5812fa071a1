//! The generation engine: model registry, admission and the two entry points.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;
use serving_engine::{
    ModelBackend, ModelSpec, Result, SamplingConfig, ServingError, Status, TokenId,
};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::decode::{DecodeState, FinishReason};
use crate::loader;
use crate::lock;
use crate::reaper::Reaper;
use crate::session::{SessionTable, StreamingSession};
use crate::slots::{SlotGuard, SlotPool};
use crate::telemetry::{GenerationMetrics, InferenceTimer, TelemetryHook, TracingTelemetry};

/// Result of a blocking [`GenerationEngine::generate`] call.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutput {
    pub request_id: Uuid,
    /// One sequence per returned beam, best first. Never empty, but a
    /// sequence itself is empty when the first token decoded was EOS.
    pub sequences: Vec<Vec<TokenId>>,
    pub finish_reason: FinishReason,
    pub prompt_tokens: usize,
    pub metrics: GenerationMetrics,
}

impl GenerationOutput {
    /// The best sequence.
    pub fn tokens(&self) -> &[TokenId] {
        self.sequences.first().map(Vec::as_slice).unwrap_or_default()
    }
}

/// Owns loaded models, running sessions and the decode slot pool.
pub struct GenerationEngine {
    config: EngineConfig,
    models: RwLock<HashMap<String, Arc<dyn ModelBackend>>>,
    sessions: Arc<SessionTable>,
    slots: Arc<SlotPool>,
    telemetry: Arc<dyn TelemetryHook>,
    shut_down: AtomicBool,
    reaper: Mutex<Option<Reaper>>,
}

impl GenerationEngine {
    /// An engine with no models loaded.
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::new_with_telemetry(config, Arc::new(TracingTelemetry))
    }

    pub fn new_with_telemetry(
        config: EngineConfig,
        telemetry: Arc<dyn TelemetryHook>,
    ) -> Result<Self> {
        let sessions = SessionTable::new();
        let reaper = Reaper::spawn(
            Arc::clone(&sessions),
            config.session_idle_timeout(),
            config.reaper_interval(),
        )?;

        Ok(Self {
            slots: SlotPool::new(config.max_concurrent_requests),
            config,
            models: RwLock::new(HashMap::new()),
            sessions,
            telemetry,
            shut_down: AtomicBool::new(false),
            reaper: Mutex::new(Some(reaper)),
        })
    }

    /// Load every model under `model_dir`, reading `serving.json` for limits.
    pub fn init(model_dir: impl AsRef<Path>) -> Result<Self> {
        let model_dir = model_dir.as_ref();
        let config = loader::load_engine_config(model_dir)?;
        Self::init_with_config(model_dir, config)
    }

    /// Load every model under `model_dir` with explicit limits.
    pub fn init_with_config(model_dir: impl AsRef<Path>, config: EngineConfig) -> Result<Self> {
        let model_dir = model_dir.as_ref();
        let engine = Self::new(config)?;
        for backend in loader::load_models(model_dir)? {
            engine.register_model(backend)?;
        }
        info!(
            model_dir = %model_dir.display(),
            models = engine.model_count(),
            slots = engine.config.max_concurrent_requests,
            "engine initialized"
        );
        Ok(engine)
    }

    /// Make a backend servable under its spec name.
    pub fn register_model(&self, backend: Arc<dyn ModelBackend>) -> Result<()> {
        let spec = backend.spec();
        spec.validate()?;
        let name = spec.name.clone();

        let mut models = self.models.write().unwrap_or_else(|e| e.into_inner());
        if models.contains_key(&name) {
            return Err(ServingError::InvalidArgument(format!(
                "model {name} is already registered"
            )));
        }
        info!(
            model = %name,
            vocab_size = spec.vocab_size,
            max_seq_len = spec.max_seq_len,
            "model loaded"
        );
        models.insert(name, backend);
        Ok(())
    }

    /// Loaded model names, sorted.
    pub fn model_names(&self) -> Vec<String> {
        let models = self.models.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = models.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn model_count(&self) -> usize {
        self.models.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn model_spec(&self, name: &str) -> Option<ModelSpec> {
        self.models
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .map(|backend| backend.spec().clone())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Decode to completion on the calling thread.
    pub fn generate(
        &self,
        model_name: &str,
        prompt: &[TokenId],
        config: SamplingConfig,
    ) -> Result<GenerationOutput> {
        let request_id = Uuid::new_v4();
        let span = info_span!("generate", %request_id, model = model_name);
        let _enter = span.enter();

        let (backend, slot) = self.admit(model_name, prompt, &config)?;
        let mut timer = InferenceTimer::new(model_name, prompt.len(), Arc::clone(&self.telemetry));

        let decode = DecodeState::new(backend, prompt.to_vec(), &config);
        let result = decode.run_to_end(self.config.beam_output, |_| timer.mark_token());
        drop(slot);
        let metrics = timer.finish();

        let (sequences, finish_reason) = result.inspect_err(|e| {
            warn!(code = %e.code(), error = %e, "generation failed");
        })?;
        debug!(%finish_reason, tokens = metrics.generated_tokens, "generation finished");

        Ok(GenerationOutput {
            request_id,
            sequences,
            finish_reason,
            prompt_tokens: prompt.len(),
            metrics,
        })
    }

    /// Boundary form of [`generate`](Self::generate): status plus sequences
    /// (empty unless the status is `Success`).
    pub fn generate_with_status(
        &self,
        model_name: &str,
        prompt: &[TokenId],
        config: SamplingConfig,
    ) -> (Status, Vec<Vec<TokenId>>) {
        match self.generate(model_name, prompt, config) {
            Ok(output) => (Status::ok(), output.sequences),
            Err(e) => (Status::from(&e), Vec::new()),
        }
    }

    /// Validate, take a slot and register a session. No decoding happens
    /// until the session is pulled.
    pub fn generate_streaming(
        &self,
        model_name: &str,
        prompt: &[TokenId],
        config: SamplingConfig,
    ) -> Result<StreamingSession> {
        let request_id = Uuid::new_v4();
        let span = info_span!("generate_streaming", %request_id, model = model_name);
        let _enter = span.enter();

        let (backend, slot) = self.admit(model_name, prompt, &config)?;
        let timer = InferenceTimer::new(model_name, prompt.len(), Arc::clone(&self.telemetry));
        let decode = DecodeState::new(backend, prompt.to_vec(), &config);

        let session = StreamingSession::new(
            request_id,
            model_name,
            decode,
            slot,
            timer,
            &self.sessions,
        );
        self.sessions.insert(session.clone());
        // A shutdown that snapshotted the table before this insert missed it.
        if self.is_shut_down() {
            session.cancel();
            return Err(ServingError::Cancelled("engine is shut down".into()));
        }
        debug!(active = self.sessions.len(), "streaming session opened");
        Ok(session)
    }

    /// Boundary form of [`generate_streaming`](Self::generate_streaming).
    pub fn generate_streaming_with_status(
        &self,
        model_name: &str,
        prompt: &[TokenId],
        config: SamplingConfig,
    ) -> (Status, Option<StreamingSession>) {
        match self.generate_streaming(model_name, prompt, config) {
            Ok(session) => (Status::ok(), Some(session)),
            Err(e) => (Status::from(&e), None),
        }
    }

    /// A running session by id.
    pub fn session(&self, id: &Uuid) -> Option<StreamingSession> {
        self.sessions.get(id)
    }

    /// Cancel a running session by id.
    pub fn cancel(&self, id: &Uuid) -> Result<()> {
        let session = self
            .sessions
            .get(id)
            .ok_or_else(|| ServingError::NotFound(format!("session {id}")))?;
        if session.cancel() {
            debug!(session_id = %id, "session cancelled");
        }
        Ok(())
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn available_slots(&self) -> usize {
        self.slots.available()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    /// Stop the reaper and cancel every running session. Idempotent.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(mut reaper) = lock(&self.reaper).take() {
            reaper.stop();
        }
        let running = self.sessions.snapshot();
        let cancelled = running.iter().filter(|s| s.cancel()).count();
        info!(cancelled, "engine shut down");
    }

    /// Shared request validation and slot admission.
    fn admit(
        &self,
        model_name: &str,
        prompt: &[TokenId],
        config: &SamplingConfig,
    ) -> Result<(Arc<dyn ModelBackend>, SlotGuard)> {
        if self.is_shut_down() {
            return Err(ServingError::Cancelled("engine is shut down".into()));
        }

        let backend = self
            .models
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(model_name)
            .cloned()
            .ok_or_else(|| ServingError::NotFound(format!("model {model_name}")))?;

        config.validate()?;
        validate_prompt(backend.spec(), prompt, self.config.max_input_len)?;

        let slot = self.slots.try_acquire().ok_or_else(|| {
            warn!(
                capacity = self.slots.capacity(),
                "no free decode slot, rejecting request"
            );
            ServingError::ResourceExhausted(format!(
                "all {} decode slots are in use",
                self.slots.capacity()
            ))
        })?;
        Ok((backend, slot))
    }
}

impl Drop for GenerationEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn validate_prompt(spec: &ModelSpec, prompt: &[TokenId], max_input_len: usize) -> Result<()> {
    if prompt.is_empty() {
        return Err(ServingError::InvalidArgument("prompt is empty".into()));
    }
    if prompt.len() > max_input_len {
        return Err(ServingError::InvalidArgument(format!(
            "prompt has {} tokens, limit is {max_input_len}",
            prompt.len()
        )));
    }
    if prompt.len() >= spec.max_seq_len {
        return Err(ServingError::InvalidArgument(format!(
            "prompt has {} tokens, model {} has a context of {}",
            prompt.len(),
            spec.name,
            spec.max_seq_len
        )));
    }
    if let Some(&bad) = prompt.iter().find(|&&t| !spec.contains_token(t)) {
        return Err(ServingError::InvalidArgument(format!(
            "token {bad} outside vocabulary of {}",
            spec.vocab_size
        )));
    }
    Ok(())
}
