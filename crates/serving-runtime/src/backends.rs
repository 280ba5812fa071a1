//! Built-in deterministic model backends.
//!
//! Neither backend runs a network. They exist so the control surface can be
//! served and tested end to end without weights:
//! - [`ScriptedModel`] emits a fixed token script, then EOS.
//! - [`SyntheticModel`] derives pseudo-random logits from the context.

use serving_engine::{ModelBackend, ModelSpec, Result, ServingError, TokenId};

/// One-hot logits for `token`.
fn one_hot(vocab_size: usize, token: TokenId) -> Vec<f32> {
    let mut logits = vec![f32::NEG_INFINITY; vocab_size];
    logits[token as usize] = 0.0;
    logits
}

/// Emits `tokens` in order regardless of the prompt, then EOS.
///
/// `fail_at` makes the n-th decode step fail with an internal error, standing
/// in for a backend that dies mid-request.
#[derive(Debug, Clone)]
pub struct ScriptedModel {
    spec: ModelSpec,
    tokens: Vec<TokenId>,
    fail_at: Option<usize>,
}

impl ScriptedModel {
    pub fn new(spec: ModelSpec, tokens: Vec<TokenId>) -> Result<Self> {
        if let Some(&bad) = tokens.iter().find(|&&t| !spec.contains_token(t)) {
            return Err(ServingError::ModelLoad(format!(
                "model {}: scripted token {bad} outside vocabulary of {}",
                spec.name, spec.vocab_size
            )));
        }
        Ok(Self {
            spec,
            tokens,
            fail_at: None,
        })
    }

    pub fn with_fail_at(mut self, step: usize) -> Self {
        self.fail_at = Some(step);
        self
    }
}

impl ModelBackend for ScriptedModel {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn next_logits(&self, _prompt: &[TokenId], generated: &[TokenId]) -> Result<Vec<f32>> {
        let step = generated.len();
        if self.fail_at == Some(step) {
            return Err(ServingError::Internal(format!(
                "model {} failed at decode step {step}",
                self.spec.name
            )));
        }
        let next = self
            .tokens
            .get(step)
            .copied()
            .unwrap_or(self.spec.eos_token_id);
        Ok(one_hot(self.spec.vocab_size, next))
    }
}

/// Pseudo-random logits keyed on (seed, last token, position).
///
/// The same context always yields the same logits, so seeded sampling over
/// this backend is reproducible.
#[derive(Debug, Clone)]
pub struct SyntheticModel {
    spec: ModelSpec,
}

impl SyntheticModel {
    pub fn new(spec: ModelSpec) -> Self {
        Self { spec }
    }
}

impl ModelBackend for SyntheticModel {
    fn spec(&self) -> &ModelSpec {
        &self.spec
    }

    fn next_logits(&self, prompt: &[TokenId], generated: &[TokenId]) -> Result<Vec<f32>> {
        let last = generated.last().or_else(|| prompt.last()).copied().unwrap_or(0);
        let position = (prompt.len() + generated.len()) as u64;

        let mut state = self.spec.seed
            ^ (last as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
            ^ position.rotate_left(32);
        if state == 0 {
            state = 1;
        }

        let logits = (0..self.spec.vocab_size)
            .map(|_| {
                // xorshift64
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                ((state >> 40) as f32 / (1u64 << 24) as f32 - 0.5) * 8.0
            })
            .collect();
        Ok(logits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> ModelSpec {
        ModelSpec::new("m", 16).with_eos_token_id(0)
    }

    #[test]
    fn scripted_emits_script_then_eos() {
        let model = ScriptedModel::new(spec(), vec![7, 9]).unwrap();
        assert_eq!(hot(&model.next_logits(&[1], &[]).unwrap()), 7);
        assert_eq!(hot(&model.next_logits(&[1], &[7]).unwrap()), 9);
        assert_eq!(hot(&model.next_logits(&[1], &[7, 9]).unwrap()), 0);
    }

    #[test]
    fn scripted_rejects_tokens_outside_vocab() {
        assert!(ScriptedModel::new(spec(), vec![16]).is_err());
        assert!(ScriptedModel::new(spec(), vec![-1]).is_err());
    }

    #[test]
    fn scripted_fail_at_injects_internal_error() {
        let model = ScriptedModel::new(spec(), vec![7, 9]).unwrap().with_fail_at(1);
        assert!(model.next_logits(&[1], &[]).is_ok());
        let err = model.next_logits(&[1], &[7]).unwrap_err();
        assert!(matches!(err, ServingError::Internal(_)));
    }

    #[test]
    fn synthetic_is_deterministic_per_context() {
        let model = SyntheticModel::new(spec());
        let a = model.next_logits(&[1, 2], &[3]).unwrap();
        let b = model.next_logits(&[1, 2], &[3]).unwrap();
        let c = model.next_logits(&[1, 2], &[4]).unwrap();
        assert_eq!(a.len(), 16);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|l| l.is_finite() && l.abs() <= 4.0));
    }

    fn hot(logits: &[f32]) -> usize {
        logits.iter().position(|&l| l == 0.0).unwrap()
    }
}
