//! # serving-sampling
//!
//! Token selection for the serving runtime.
//!
//! Supports:
//! - Temperature scaling
//! - Top-k filtering
//! - Top-p (nucleus) filtering
//! - Deterministic seeded RNG so a request replays identically
//! - Beam search ([`BeamSearch`]) for `beam_width > 1`

mod beam;

pub use beam::{BeamSearch, Hypothesis};

use serving_engine::SamplingConfig;

/// Sampling error type.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SamplingError {
    #[error("Invalid logits array")]
    InvalidLogits,
    #[error("Temperature must be > 0")]
    InvalidTemperature,
    #[error("No valid tokens after filtering")]
    NoValidTokens,
}

pub type SamplingResult<T> = std::result::Result<T, SamplingError>;

/// Deterministic RNG for reproducible sampling.
///
/// Uses a simple xorshift64 algorithm for fast, reproducible random numbers.
#[derive(Debug, Clone)]
pub struct SeededRng {
    state: u64,
}

impl SeededRng {
    pub fn new(seed: u64) -> Self {
        // Zero is a fixed point of xorshift
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    /// Generate next random float in [0, 1).
    pub fn next_f32(&mut self) -> f32 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        (self.state >> 40) as f32 / (1u64 << 24) as f32
    }
}

/// Single-hypothesis sampler.
#[derive(Debug, Clone)]
pub struct Sampler {
    /// Temperature for softmax scaling. > 1.0 = more random, < 1.0 = more deterministic.
    pub temperature: f32,

    /// Top-k: only sample from top k logits.
    pub top_k: Option<usize>,

    /// Top-p (nucleus sampling): sample from smallest set of tokens with cumulative prob >= p.
    pub top_p: Option<f32>,

    /// RNG state for reproducible sampling. Mutated on each call.
    rng: SeededRng,
}

impl Sampler {
    pub fn new() -> Self {
        Self {
            temperature: 1.0,
            top_k: None,
            top_p: None,
            rng: SeededRng::new(42),
        }
    }

    /// Build a sampler for one request. Disabled filters (`top_k == 0`,
    /// `top_p == 1.0`) are left off.
    pub fn from_config(config: &SamplingConfig, seed: u64) -> Self {
        let mut sampler = Self::new()
            .with_temperature(config.temperature)
            .with_seed(seed);
        if config.top_k > 0 {
            sampler = sampler.with_top_k(config.top_k as usize);
        }
        if config.top_p < 1.0 {
            sampler = sampler.with_top_p(config.top_p);
        }
        sampler
    }

    pub fn with_temperature(mut self, temp: f32) -> Self {
        self.temperature = temp;
        self
    }

    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = Some(k);
        self
    }

    pub fn with_top_p(mut self, p: f32) -> Self {
        self.top_p = Some(p);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = SeededRng::new(seed);
        self
    }

    /// Pick a token index from raw logits.
    ///
    /// Order: temperature, top-k mask, softmax, then either argmax (for a
    /// near-zero temperature) or top-p truncation and a seeded draw.
    pub fn sample(&mut self, logits: &[f32]) -> SamplingResult<usize> {
        if logits.is_empty() {
            return Err(SamplingError::InvalidLogits);
        }
        if self.temperature <= 0.0 {
            return Err(SamplingError::InvalidTemperature);
        }

        let mut scaled: Vec<f32> = logits.iter().map(|&l| l / self.temperature).collect();
        if let Some(k) = self.top_k {
            mask_below_top_k(&mut scaled, k);
        }

        let mut probs = Self::softmax(&scaled);
        if self.temperature < GREEDY_TEMPERATURE {
            return Ok(argmax(&probs));
        }
        if let Some(p) = self.top_p {
            keep_nucleus(&mut probs, p);
        }
        self.draw(&probs)
    }

    pub(crate) fn softmax(logits: &[f32]) -> Vec<f32> {
        let uniform = || vec![1.0 / logits.len() as f32; logits.len()];
        let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        if !max.is_finite() {
            return uniform();
        }
        let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
        let total: f32 = exps.iter().sum();
        if total > 0.0 {
            exps.into_iter().map(|e| e / total).collect()
        } else {
            uniform()
        }
    }

    /// Inverse-CDF draw over `probs`.
    fn draw(&mut self, probs: &[f32]) -> SamplingResult<usize> {
        let r = self.rng.next_f32();
        let mut mass = 0.0;
        probs
            .iter()
            .position(|&pr| {
                mass += pr;
                r < mass
            })
            // rounding can leave r above the total mass
            .or_else(|| probs.iter().rposition(|&pr| pr > 0.0))
            .ok_or(SamplingError::NoValidTokens)
    }
}

/// Below this temperature the distribution is treated as a point mass.
const GREEDY_TEMPERATURE: f32 = 1e-3;

/// Mask every logit below the k-th largest. Ties at the threshold survive.
fn mask_below_top_k(logits: &mut [f32], k: usize) {
    if k == 0 || k >= logits.len() {
        return;
    }
    let mut sorted = logits.to_vec();
    sorted.sort_unstable_by(|a, b| b.total_cmp(a));
    let threshold = sorted[k - 1];
    logits
        .iter_mut()
        .filter(|l| **l < threshold)
        .for_each(|l| *l = f32::NEG_INFINITY);
}

/// Keep the smallest most-probable set whose mass reaches `p`, renormalized.
fn keep_nucleus(probs: &mut [f32], p: f32) {
    let mut sorted = probs.to_vec();
    sorted.sort_unstable_by(|a, b| b.total_cmp(a));
    let mut mass = 0.0;
    let cutoff = sorted
        .iter()
        .copied()
        .find(|&pr| {
            mass += pr;
            mass >= p
        })
        .or_else(|| sorted.last().copied())
        .unwrap_or(0.0);

    probs
        .iter_mut()
        .filter(|pr| **pr < cutoff)
        .for_each(|pr| *pr = 0.0);
    let total: f32 = probs.iter().sum();
    if total > 0.0 {
        probs.iter_mut().for_each(|pr| *pr /= total);
    }
}

/// Index of the largest probability; the first one wins a tie.
fn argmax(probs: &[f32]) -> usize {
    probs
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &pr)| {
            if pr > best.1 {
                (i, pr)
            } else {
                best
            }
        })
        .0
}

impl Default for Sampler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_hot_logits_always_pick_the_hot_token() {
        let mut logits = vec![f32::NEG_INFINITY; 16];
        logits[7] = 0.0;
        let mut sampler = Sampler::from_config(&SamplingConfig::default(), 42);
        for _ in 0..20 {
            assert_eq!(sampler.sample(&logits).unwrap(), 7);
        }
    }

    #[test]
    fn from_config_leaves_disabled_filters_off() {
        let sampler = Sampler::from_config(&SamplingConfig::default(), 7);
        assert!(sampler.top_k.is_none());
        assert!(sampler.top_p.is_none());

        let cfg = SamplingConfig::default().with_top_k(5).with_top_p(0.5);
        let sampler = Sampler::from_config(&cfg, 7);
        assert_eq!(sampler.top_k, Some(5));
        assert_eq!(sampler.top_p, Some(0.5));
    }

    #[test]
    fn softmax_uniform() {
        let probs = Sampler::softmax(&[1.0, 1.0, 1.0]);
        assert_eq!(probs.len(), 3);
        assert!((probs[0] - 1.0 / 3.0).abs() < 1e-5);
        assert!((probs.iter().sum::<f32>() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn softmax_all_masked_falls_back_to_uniform() {
        let probs = Sampler::softmax(&[f32::NEG_INFINITY; 4]);
        assert!(probs.iter().all(|p| (p - 0.25).abs() < 1e-6));
    }

    #[test]
    fn top_k_keeps_ties_at_threshold() {
        let mut logits = vec![1.0, 10.0, 3.0, 0.5, 3.0];
        mask_below_top_k(&mut logits, 2);
        assert!(logits[1].is_finite());
        assert!(logits[2].is_finite());
        assert!(logits[4].is_finite());
        assert!(!logits[0].is_finite());
        assert!(!logits[3].is_finite());
    }

    #[test]
    fn nucleus_truncates_and_renormalizes() {
        let mut probs = vec![0.5, 0.3, 0.15, 0.05];
        keep_nucleus(&mut probs, 0.8);
        assert!((probs[0] - 0.625).abs() < 1e-6);
        assert!((probs[1] - 0.375).abs() < 1e-6);
        assert_eq!(&probs[2..], &[0.0, 0.0]);
    }

    #[test]
    fn argmax_prefers_first_of_equal_maxima() {
        assert_eq!(argmax(&[0.1, 0.4, 0.4, 0.1]), 1);
    }

    #[test]
    fn draw_with_no_mass_has_no_token() {
        let mut sampler = Sampler::new();
        assert_eq!(sampler.draw(&[0.0, 0.0]), Err(SamplingError::NoValidTokens));
    }
}
