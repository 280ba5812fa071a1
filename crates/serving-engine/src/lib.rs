//! # serving-engine
//!
//! The "narrow waist" of the serving stack. Defines the result codes, the
//! boundary [`Status`] shape, the [`SamplingConfig`] value and the
//! [`ModelBackend`] trait that every other crate depends on. The runtime drives
//! any backend through this trait without knowing how logits are produced.
//!
//! ## Design Notes
//!
//! ### Interior Mutability
//! `ModelBackend` methods take `&self` so one loaded model can serve many
//! concurrent requests. Backends that cache state internally are responsible
//! for their own synchronization.
//!
//! ### Token Type
//! `TokenId` is aliased as `i32` to match the wire format callers send, though
//! token IDs are logically non-negative. Backends reject ids outside
//! `[0, vocab_size)` at admission time.

mod error;
mod sampling;
mod status;

pub use error::{Result, ServingError};
pub use sampling::{GenerationConfig, SamplingConfig, MAX_BEAM_WIDTH, MAX_TOP_K};
pub use status::{RetCode, Status};

use serde::{Deserialize, Serialize};

/// Token ID type (i32 for wire compat; logically non-negative).
pub type TokenId = i32;

/// Serving parameters of one loaded model.
///
/// The engine owns the stop policy: decoding ends at `eos_token_id`, after
/// `max_new_tokens` generated tokens, or when prompt plus output reaches
/// `max_seq_len`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSpec {
    /// Name callers use to address the model.
    pub name: String,
    /// Number of entries in the next-token distribution.
    pub vocab_size: usize,
    /// End-of-sequence token. Never emitted to callers.
    pub eos_token_id: TokenId,
    /// Context window (prompt + generated tokens).
    pub max_seq_len: usize,
    /// Upper bound on generated tokens per request.
    pub max_new_tokens: usize,
    /// Seed for the per-request sampler RNG.
    pub seed: u64,
}

impl Default for ModelSpec {
    fn default() -> Self {
        Self {
            name: String::new(),
            vocab_size: 32_000,
            eos_token_id: 2,
            max_seq_len: 4096,
            max_new_tokens: 256,
            seed: 42,
        }
    }
}

impl ModelSpec {
    /// Create a spec with default limits for the given name and vocabulary.
    pub fn new(name: impl Into<String>, vocab_size: usize) -> Self {
        Self {
            name: name.into(),
            vocab_size,
            ..Self::default()
        }
    }

    pub fn with_eos_token_id(mut self, eos: TokenId) -> Self {
        self.eos_token_id = eos;
        self
    }

    pub fn with_max_seq_len(mut self, n: usize) -> Self {
        self.max_seq_len = n;
        self
    }

    pub fn with_max_new_tokens(mut self, n: usize) -> Self {
        self.max_new_tokens = n;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Check that these parameters describe a servable model.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(ServingError::ModelLoad("model name is empty".into()));
        }
        if self.vocab_size == 0 {
            return Err(ServingError::ModelLoad(format!(
                "model {}: vocab_size must be positive",
                self.name
            )));
        }
        if !self.contains_token(self.eos_token_id) {
            return Err(ServingError::ModelLoad(format!(
                "model {}: eos_token_id {} outside vocabulary of {}",
                self.name, self.eos_token_id, self.vocab_size
            )));
        }
        if self.max_seq_len == 0 || self.max_new_tokens == 0 {
            return Err(ServingError::ModelLoad(format!(
                "model {}: max_seq_len and max_new_tokens must be positive",
                self.name
            )));
        }
        Ok(())
    }

    /// Whether `token` is a valid id for this model's vocabulary.
    pub fn contains_token(&self, token: TokenId) -> bool {
        token >= 0 && (token as usize) < self.vocab_size
    }
}

/// The model execution seam: everything that produces logits plugs in here.
///
/// The runtime owns request lifecycle, sampling and stop policy; a backend only
/// answers "what is the next-token distribution for this context".
pub trait ModelBackend: Send + Sync {
    /// Serving parameters for this model.
    fn spec(&self) -> &ModelSpec;

    /// Next-token logits (length `vocab_size`) given the prompt and the tokens
    /// generated so far for one hypothesis.
    fn next_logits(&self, prompt: &[TokenId], generated: &[TokenId]) -> Result<Vec<f32>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_spec_is_valid_once_named() {
        assert!(ModelSpec::default().validate().is_err());
        assert!(ModelSpec::new("tiny", 16).with_eos_token_id(0).validate().is_ok());
    }

    #[test]
    fn spec_rejects_eos_outside_vocab() {
        let spec = ModelSpec::new("tiny", 4).with_eos_token_id(9);
        let err = spec.validate().unwrap_err();
        assert_eq!(err.code(), RetCode::ModelLoad);
        assert!(err.to_string().contains("eos_token_id"));
    }

    #[test]
    fn contains_token_bounds() {
        let spec = ModelSpec::new("tiny", 4);
        assert!(spec.contains_token(0));
        assert!(spec.contains_token(3));
        assert!(!spec.contains_token(4));
        assert!(!spec.contains_token(-1));
    }

    #[test]
    fn spec_deserializes_with_defaults() {
        let spec: ModelSpec = serde_json::from_str(r#"{"name":"m","vocab_size":8,"eos_token_id":1}"#).unwrap();
        assert_eq!(spec.max_new_tokens, 256);
        assert_eq!(spec.seed, 42);
        assert!(spec.validate().is_ok());
    }
}
