//! Configuration for the generation engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What `generate` returns when `beam_width > 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BeamOutput {
    /// Only the highest-scoring sequence.
    #[default]
    Best,
    /// Every finished beam, best first.
    All,
}

/// Engine-wide serving limits.
///
/// Read from `serving.json` in the model directory when present; every field
/// is optional there.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Decode slots shared by all requests (blocking and streaming).
    pub max_concurrent_requests: usize,

    /// Longest prompt admitted, in tokens.
    pub max_input_len: usize,

    /// Streaming sessions not pulled for this long are evicted.
    pub session_idle_timeout_ms: u64,

    /// How often the reaper looks for idle sessions.
    pub reaper_interval_ms: u64,

    /// Output shape of `generate` under beam search.
    pub beam_output: BeamOutput,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_requests: 64,
            max_input_len: 4096,
            session_idle_timeout_ms: 60_000,
            reaper_interval_ms: 1_000,
            beam_output: BeamOutput::Best,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_concurrent_requests(mut self, n: usize) -> Self {
        self.max_concurrent_requests = n;
        self
    }

    pub fn with_max_input_len(mut self, n: usize) -> Self {
        self.max_input_len = n;
        self
    }

    pub fn with_session_idle_timeout(mut self, timeout: Duration) -> Self {
        self.session_idle_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_reaper_interval(mut self, interval: Duration) -> Self {
        self.reaper_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_beam_output(mut self, output: BeamOutput) -> Self {
        self.beam_output = output;
        self
    }

    pub fn session_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.session_idle_timeout_ms)
    }

    /// Reaper period, never below one millisecond.
    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_concurrent_requests, 64);
        assert_eq!(cfg.beam_output, BeamOutput::Best);
        assert_eq!(cfg.session_idle_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: EngineConfig =
            serde_json::from_str(r#"{"max_concurrent_requests": 2, "beam_output": "all"}"#)
                .unwrap();
        assert_eq!(cfg.max_concurrent_requests, 2);
        assert_eq!(cfg.beam_output, BeamOutput::All);
        assert_eq!(cfg.max_input_len, 4096);
    }

    #[test]
    fn builders_round_trip_durations() {
        let cfg = EngineConfig::new()
            .with_session_idle_timeout(Duration::from_millis(250))
            .with_reaper_interval(Duration::ZERO);
        assert_eq!(cfg.session_idle_timeout(), Duration::from_millis(250));
        assert_eq!(cfg.reaper_interval(), Duration::from_millis(1));
    }
}
