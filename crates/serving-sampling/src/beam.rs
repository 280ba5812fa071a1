//! Deterministic beam search.
//!
//! Keeps `width` live hypotheses. Each step expands every live hypothesis by
//! its `width` most likely next tokens and keeps the best `width` expansions
//! by cumulative log-probability. A hypothesis that picks `eos` moves to the
//! finished set without the `eos` token. Search is done once `width`
//! hypotheses have finished or no live hypothesis remains.

use std::cmp::Ordering;

use crate::{SamplingError, SamplingResult};

/// One candidate output sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    pub tokens: Vec<usize>,
    /// Sum of token log-probabilities.
    pub log_prob: f32,
}

impl Hypothesis {
    fn empty() -> Self {
        Self {
            tokens: Vec::new(),
            log_prob: 0.0,
        }
    }

    /// Length-normalized score used for ranking.
    pub fn score(&self) -> f32 {
        self.log_prob / self.tokens.len().max(1) as f32
    }
}

#[derive(Debug, Clone)]
pub struct BeamSearch {
    width: usize,
    temperature: f32,
    eos: usize,
    live: Vec<Hypothesis>,
    finished: Vec<Hypothesis>,
}

impl BeamSearch {
    pub fn new(width: usize, temperature: f32, eos: usize) -> Self {
        Self {
            width: width.max(1),
            temperature,
            eos,
            live: vec![Hypothesis::empty()],
            finished: Vec::new(),
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Hypotheses still being extended. `step` expects one logits row per entry.
    pub fn live(&self) -> &[Hypothesis] {
        &self.live
    }

    pub fn is_done(&self) -> bool {
        self.live.is_empty() || self.finished.len() >= self.width
    }

    /// Length of the longest live hypothesis.
    pub fn max_len(&self) -> usize {
        self.live.iter().map(|h| h.tokens.len()).max().unwrap_or(0)
    }

    /// Advance every live hypothesis by one token.
    pub fn step(&mut self, logits: &[Vec<f32>]) -> SamplingResult<()> {
        if self.temperature <= 0.0 {
            return Err(SamplingError::InvalidTemperature);
        }
        if logits.len() != self.live.len() || logits.iter().any(|row| row.is_empty()) {
            return Err(SamplingError::InvalidLogits);
        }

        // (parent, token, cumulative log-prob)
        let mut candidates: Vec<(usize, usize, f32)> = Vec::new();
        for (parent, (hyp, row)) in self.live.iter().zip(logits).enumerate() {
            let log_probs = log_softmax(row, self.temperature);
            let mut ranked: Vec<(usize, f32)> = log_probs
                .into_iter()
                .enumerate()
                .filter(|(_, lp)| lp.is_finite())
                .collect();
            ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
            ranked.truncate(self.width);
            candidates.extend(
                ranked
                    .into_iter()
                    .map(|(token, lp)| (parent, token, hyp.log_prob + lp)),
            );
        }

        if candidates.is_empty() {
            return Err(SamplingError::NoValidTokens);
        }

        candidates.sort_by(|a, b| {
            b.2.partial_cmp(&a.2)
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
                .then(a.1.cmp(&b.1))
        });

        let mut next_live = Vec::with_capacity(self.width);
        for (parent, token, log_prob) in candidates {
            if next_live.len() >= self.width {
                break;
            }
            let mut tokens = self.live[parent].tokens.clone();
            if token == self.eos {
                if self.finished.len() < self.width {
                    self.finished.push(Hypothesis { tokens, log_prob });
                }
                continue;
            }
            tokens.push(token);
            next_live.push(Hypothesis { tokens, log_prob });
        }

        self.live = next_live;
        Ok(())
    }

    /// Stop searching (length limit) and keep the live hypotheses as results.
    pub fn finish(&mut self) {
        let live = std::mem::take(&mut self.live);
        self.finished.extend(live);
    }

    /// Finished hypotheses, best first, at most `width`.
    pub fn ranked(&self) -> Vec<Hypothesis> {
        let mut ranked = self.finished.clone();
        ranked.sort_by(|a, b| b.score().partial_cmp(&a.score()).unwrap_or(Ordering::Equal));
        ranked.truncate(self.width);
        ranked
    }

    /// Tokens every live and finished hypothesis agrees on.
    ///
    /// Every future result extends one of these hypotheses, so this prefix is
    /// final and only ever grows.
    pub fn committed_prefix(&self) -> Vec<usize> {
        let mut all = self.live.iter().chain(self.finished.iter());
        let Some(first) = all.next() else {
            return Vec::new();
        };
        let mut len = first.tokens.len();
        for hyp in all {
            len = len.min(
                first
                    .tokens
                    .iter()
                    .zip(&hyp.tokens)
                    .take_while(|(a, b)| a == b)
                    .count(),
            );
        }
        first.tokens[..len].to_vec()
    }
}

fn log_softmax(logits: &[f32], temperature: f32) -> Vec<f32> {
    let scaled: Vec<f32> = logits.iter().map(|l| l / temperature).collect();
    let max = scaled.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return vec![f32::NEG_INFINITY; scaled.len()];
    }
    let log_sum = scaled.iter().map(|l| (l - max).exp()).sum::<f32>().ln();
    scaled.iter().map(|l| l - max - log_sum).collect()
}
