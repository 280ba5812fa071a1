//! Per-request decoding state.
//!
//! A [`DecodeState`] owns everything one request needs to advance: the prompt,
//! the tokens produced so far, and either a seeded [`Sampler`] (beam width 1)
//! or a [`BeamSearch`]. Both the blocking and the streaming paths drive the
//! same state, so a drained stream equals the blocking result.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serving_engine::{ModelBackend, Result, SamplingConfig, ServingError, TokenId};
use serving_sampling::{BeamSearch, Sampler, SamplingError};

use crate::config::BeamOutput;

/// Why decoding ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// The model produced its end-of-sequence token (every beam, under beam search).
    Stop,
    /// `max_new_tokens` or the context window was reached.
    Length,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinishReason::Stop => write!(f, "stop"),
            FinishReason::Length => write!(f, "length"),
        }
    }
}

enum Strategy {
    Sample {
        sampler: Sampler,
        generated: Vec<TokenId>,
    },
    Beam {
        search: BeamSearch,
        /// Tokens of the eventual best hypothesis already queued for emission.
        emitted: usize,
        pending: VecDeque<TokenId>,
    },
}

pub(crate) struct DecodeState {
    backend: Arc<dyn ModelBackend>,
    prompt: Vec<TokenId>,
    max_new_tokens: usize,
    strategy: Strategy,
    finish_reason: Option<FinishReason>,
}

fn sampling_failed(e: SamplingError) -> ServingError {
    ServingError::Internal(format!("sampling failed: {e}"))
}

impl DecodeState {
    /// The caller has already validated `prompt` and `config` against the model.
    pub(crate) fn new(
        backend: Arc<dyn ModelBackend>,
        prompt: Vec<TokenId>,
        config: &SamplingConfig,
    ) -> Self {
        let spec = backend.spec();
        let max_new_tokens = spec
            .max_new_tokens
            .min(spec.max_seq_len.saturating_sub(prompt.len()));

        let strategy = if config.is_beam_search() {
            Strategy::Beam {
                search: BeamSearch::new(
                    config.beam_width as usize,
                    config.temperature,
                    spec.eos_token_id as usize,
                ),
                emitted: 0,
                pending: VecDeque::new(),
            }
        } else {
            Strategy::Sample {
                sampler: Sampler::from_config(config, spec.seed),
                generated: Vec::new(),
            }
        };

        Self {
            backend,
            prompt,
            max_new_tokens,
            strategy,
            finish_reason: None,
        }
    }

    pub(crate) fn finish_reason(&self) -> Option<FinishReason> {
        self.finish_reason
    }

    /// Next token in emission order, or `None` once decoding has ended.
    ///
    /// Beam search only emits tokens every surviving hypothesis agrees on, so
    /// one call may run several search steps.
    pub(crate) fn next_token(&mut self) -> Result<Option<TokenId>> {
        match self.strategy {
            Strategy::Sample { .. } => self.sample_step(),
            Strategy::Beam { .. } => self.next_beam_token(),
        }
    }

    /// Decode to completion. Returns one sequence per reported beam.
    pub(crate) fn run_to_end<F>(
        mut self,
        beam_output: BeamOutput,
        mut on_token: F,
    ) -> Result<(Vec<Vec<TokenId>>, FinishReason)>
    where
        F: FnMut(TokenId),
    {
        if matches!(self.strategy, Strategy::Sample { .. }) {
            while let Some(token) = self.sample_step()? {
                on_token(token);
            }
            let reason = self.finish_reason.unwrap_or(FinishReason::Stop);
            let Strategy::Sample { generated, .. } = self.strategy else {
                return Err(strategy_changed());
            };
            return Ok((vec![generated], reason));
        }

        while !self.beam_search_done() {
            self.beam_advance()?;
        }
        let reason = self.finish_reason.unwrap_or(FinishReason::Stop);
        let Strategy::Beam { search, .. } = &self.strategy else {
            return Err(strategy_changed());
        };

        let mut sequences: Vec<Vec<TokenId>> = search
            .ranked()
            .into_iter()
            .map(|h| h.tokens.into_iter().map(|t| t as TokenId).collect())
            .collect();
        if beam_output == BeamOutput::Best {
            sequences.truncate(1);
        }
        if let Some(best) = sequences.first() {
            best.iter().copied().for_each(&mut on_token);
        }
        Ok((sequences, reason))
    }

    fn sample_step(&mut self) -> Result<Option<TokenId>> {
        if self.finish_reason.is_some() {
            return Ok(None);
        }
        let Strategy::Sample { sampler, generated } = &mut self.strategy else {
            return Ok(None);
        };

        if generated.len() >= self.max_new_tokens {
            self.finish_reason = Some(FinishReason::Length);
            return Ok(None);
        }

        let logits = self.backend.next_logits(&self.prompt, generated)?;
        check_logits(&logits, self.backend.spec().vocab_size)?;
        let token = sampler.sample(&logits).map_err(sampling_failed)? as TokenId;

        if token == self.backend.spec().eos_token_id {
            self.finish_reason = Some(FinishReason::Stop);
            return Ok(None);
        }
        generated.push(token);
        Ok(Some(token))
    }

    fn beam_search_done(&self) -> bool {
        match &self.strategy {
            Strategy::Beam { search, .. } => search.is_done(),
            Strategy::Sample { .. } => true,
        }
    }

    /// Run one beam search step over every live hypothesis.
    fn beam_advance(&mut self) -> Result<()> {
        let Strategy::Beam { search, .. } = &mut self.strategy else {
            return Ok(());
        };
        if search.is_done() {
            return Ok(());
        }
        if search.max_len() >= self.max_new_tokens {
            search.finish();
            self.finish_reason = Some(FinishReason::Length);
            return Ok(());
        }

        let vocab_size = self.backend.spec().vocab_size;
        let mut rows = Vec::with_capacity(search.live().len());
        for hyp in search.live() {
            let generated: Vec<TokenId> = hyp.tokens.iter().map(|&t| t as TokenId).collect();
            let logits = self.backend.next_logits(&self.prompt, &generated)?;
            check_logits(&logits, vocab_size)?;
            rows.push(logits);
        }
        search.step(&rows).map_err(sampling_failed)?;

        if search.is_done() {
            self.finish_reason = Some(FinishReason::Stop);
        }
        Ok(())
    }

    fn next_beam_token(&mut self) -> Result<Option<TokenId>> {
        loop {
            let Strategy::Beam {
                search,
                emitted,
                pending,
            } = &mut self.strategy
            else {
                return Ok(None);
            };

            if let Some(token) = pending.pop_front() {
                return Ok(Some(token));
            }

            if search.is_done() {
                // Flush whatever the winning hypothesis has beyond the committed prefix.
                let best = search.ranked().into_iter().next();
                let tail: Vec<usize> = best
                    .map(|h| h.tokens.get(*emitted..).unwrap_or_default().to_vec())
                    .unwrap_or_default();
                if tail.is_empty() {
                    return Ok(None);
                }
                *emitted += tail.len();
                pending.extend(tail.into_iter().map(|t| t as TokenId));
                continue;
            }

            self.beam_advance()?;

            let Strategy::Beam {
                search,
                emitted,
                pending,
            } = &mut self.strategy
            else {
                return Ok(None);
            };
            let prefix = search.committed_prefix();
            if prefix.len() > *emitted {
                pending.extend(prefix[*emitted..].iter().map(|&t| t as TokenId));
                *emitted = prefix.len();
            }
        }
    }
}

fn strategy_changed() -> ServingError {
    ServingError::Internal("decoding strategy changed mid-request".into())
}

fn check_logits(logits: &[f32], vocab_size: usize) -> Result<()> {
    if logits.len() != vocab_size {
        return Err(ServingError::Internal(format!(
            "backend returned {} logits for a vocabulary of {vocab_size}",
            logits.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{ScriptedModel, SyntheticModel};
    use serving_engine::ModelSpec;

    fn scripted(tokens: Vec<TokenId>) -> Arc<dyn ModelBackend> {
        let spec = ModelSpec::new("scripted", 32).with_eos_token_id(0);
        Arc::new(ScriptedModel::new(spec, tokens).unwrap())
    }

    fn synthetic(max_new_tokens: usize) -> Arc<dyn ModelBackend> {
        let spec = ModelSpec::new("synthetic", 64)
            .with_eos_token_id(0)
            .with_max_new_tokens(max_new_tokens);
        Arc::new(SyntheticModel::new(spec))
    }

    fn drain(state: &mut DecodeState) -> Vec<TokenId> {
        let mut out = Vec::new();
        while let Some(t) = state.next_token().unwrap() {
            out.push(t);
        }
        out
    }

    #[test]
    fn sample_path_follows_script() {
        let mut state = DecodeState::new(scripted(vec![7, 8]), vec![1], &SamplingConfig::default());
        assert_eq!(drain(&mut state), vec![7, 8]);
        assert_eq!(state.finish_reason(), Some(FinishReason::Stop));
        // Exhausted state keeps answering None.
        assert_eq!(state.next_token().unwrap(), None);
    }

    #[test]
    fn length_limit_from_max_new_tokens() {
        let mut state = DecodeState::new(synthetic(5), vec![1, 2], &SamplingConfig::default().with_top_k(8));
        let out = drain(&mut state);
        assert!(out.len() <= 5);
        if out.len() == 5 {
            assert_eq!(state.finish_reason(), Some(FinishReason::Length));
        }
    }

    #[test]
    fn context_window_bounds_generation() {
        let spec = ModelSpec::new("tight", 32)
            .with_eos_token_id(0)
            .with_max_seq_len(4);
        let backend: Arc<dyn ModelBackend> =
            Arc::new(ScriptedModel::new(spec, vec![5, 6, 7, 8]).unwrap());
        let mut state = DecodeState::new(backend, vec![1, 2, 3], &SamplingConfig::default());
        assert_eq!(drain(&mut state), vec![5]);
        assert_eq!(state.finish_reason(), Some(FinishReason::Length));
    }

    #[test]
    fn streamed_equals_run_to_end() {
        let cfg = SamplingConfig::default().with_top_k(10).with_temperature(0.8);
        let mut streamed = DecodeState::new(synthetic(12), vec![3, 4], &cfg);
        let tokens = drain(&mut streamed);

        let blocking = DecodeState::new(synthetic(12), vec![3, 4], &cfg);
        let (sequences, _) = blocking.run_to_end(BeamOutput::Best, |_| {}).unwrap();
        assert_eq!(sequences, vec![tokens]);
    }

    #[test]
    fn beam_stream_equals_best_beam() {
        let cfg = SamplingConfig::default().with_beam_width(3);
        let mut streamed = DecodeState::new(synthetic(6), vec![9], &cfg);
        let tokens = drain(&mut streamed);

        let blocking = DecodeState::new(synthetic(6), vec![9], &cfg);
        let (sequences, _) = blocking.run_to_end(BeamOutput::All, |_| {}).unwrap();
        assert!(!sequences.is_empty() && sequences.len() <= 3);
        assert_eq!(sequences[0], tokens);
    }

    #[test]
    fn beam_over_script_matches_script() {
        let cfg = SamplingConfig::default().with_beam_width(2);
        let state = DecodeState::new(scripted(vec![7]), vec![15, 290, 42], &cfg);
        let (sequences, reason) = state.run_to_end(BeamOutput::Best, |_| {}).unwrap();
        assert_eq!(sequences, vec![vec![7]]);
        assert_eq!(reason, FinishReason::Stop);
    }

    #[test]
    fn backend_error_propagates() {
        let spec = ModelSpec::new("flaky", 32).with_eos_token_id(0);
        let backend: Arc<dyn ModelBackend> =
            Arc::new(ScriptedModel::new(spec, vec![7, 8]).unwrap().with_fail_at(1));
        let mut state = DecodeState::new(backend, vec![1], &SamplingConfig::default());
        assert_eq!(state.next_token().unwrap(), Some(7));
        assert!(matches!(state.next_token(), Err(ServingError::Internal(_))));
    }

    #[test]
    fn on_token_sees_every_emitted_token() {
        let state = DecodeState::new(scripted(vec![4, 5, 6]), vec![1], &SamplingConfig::default());
        let mut seen = Vec::new();
        let (sequences, _) = state.run_to_end(BeamOutput::Best, |t| seen.push(t)).unwrap();
        assert_eq!(seen, sequences[0]);
    }
}
