//! Sampling configuration passed into every generation call.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ServingError};

/// Widest beam search the engine admits.
pub const MAX_BEAM_WIDTH: u32 = 16;

/// Largest top-k the engine admits.
pub const MAX_TOP_K: u32 = 1024;

/// How the next-token distribution is sampled.
///
/// Construction never validates; out-of-range values are rejected by the
/// engine when a generation starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SamplingConfig {
    /// Parallel hypotheses kept during decoding. 1 = no beam search.
    pub beam_width: u32,
    /// Restrict sampling to the k most likely tokens. 0 = disabled.
    pub top_k: u32,
    /// Nucleus threshold in (0, 1]. 1.0 = disabled.
    pub top_p: f32,
    /// Logit temperature, must be > 0.
    pub temperature: f32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            beam_width: 1,
            top_k: 0,
            top_p: 1.0,
            temperature: 1.0,
        }
    }
}

impl SamplingConfig {
    pub fn new(beam_width: u32, top_k: u32, top_p: f32, temperature: f32) -> Self {
        Self {
            beam_width,
            top_k,
            top_p,
            temperature,
        }
    }

    pub fn with_beam_width(mut self, beam_width: u32) -> Self {
        self.beam_width = beam_width;
        self
    }

    pub fn with_top_k(mut self, k: u32) -> Self {
        self.top_k = k;
        self
    }

    pub fn with_top_p(mut self, p: f32) -> Self {
        self.top_p = p;
        self
    }

    pub fn with_temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    /// Whether this config asks for beam search.
    pub fn is_beam_search(&self) -> bool {
        self.beam_width > 1
    }

    /// Reject values the engine cannot honor.
    pub fn validate(&self) -> Result<()> {
        if self.beam_width == 0 || self.beam_width > MAX_BEAM_WIDTH {
            return Err(ServingError::InvalidArgument(format!(
                "beam_width must be in [1, {MAX_BEAM_WIDTH}], got {}",
                self.beam_width
            )));
        }
        if self.top_k > MAX_TOP_K {
            return Err(ServingError::InvalidArgument(format!(
                "top_k must be <= {MAX_TOP_K}, got {}",
                self.top_k
            )));
        }
        if !self.top_p.is_finite() || self.top_p <= 0.0 || self.top_p > 1.0 {
            return Err(ServingError::InvalidArgument(format!(
                "top_p must be in (0, 1], got {}",
                self.top_p
            )));
        }
        if !self.temperature.is_finite() || self.temperature <= 0.0 {
            return Err(ServingError::InvalidArgument(format!(
                "temperature must be > 0, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// Caller-level generation parameters.
///
/// Mirrors the parameter names scripting callers already use; every field is
/// optional on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub num_beams: u32,
    pub top_k: u32,
    pub top_p: f32,
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        let sampling = SamplingConfig::default();
        Self {
            num_beams: sampling.beam_width,
            top_k: sampling.top_k,
            top_p: sampling.top_p,
            temperature: sampling.temperature,
        }
    }
}

impl GenerationConfig {
    pub fn sampling_config(&self) -> SamplingConfig {
        SamplingConfig::from(self)
    }
}

impl From<&GenerationConfig> for SamplingConfig {
    fn from(config: &GenerationConfig) -> Self {
        SamplingConfig {
            beam_width: config.num_beams,
            top_k: config.top_k,
            top_p: config.top_p,
            temperature: config.temperature,
        }
    }
}
