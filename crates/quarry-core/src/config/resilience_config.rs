use serde::{Deserialize, Serialize};

use super::defaults;

/// Retry and circuit-breaker configuration shared by all dependencies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Total attempts per call, including the first.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    /// Fraction of each delay randomised (0.0–1.0).
    pub jitter_ratio: f64,
    /// Consecutive failures within `failure_window_ms` that open the circuit.
    pub failure_threshold: u32,
    pub failure_window_ms: u64,
    /// Time spent OPEN before a HALF_OPEN trial is allowed.
    pub cooldown_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::DEFAULT_MAX_ATTEMPTS,
            initial_backoff_ms: defaults::DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: defaults::DEFAULT_MAX_BACKOFF_MS,
            backoff_multiplier: defaults::DEFAULT_BACKOFF_MULTIPLIER,
            jitter_ratio: defaults::DEFAULT_JITTER_RATIO,
            failure_threshold: defaults::DEFAULT_FAILURE_THRESHOLD,
            failure_window_ms: defaults::DEFAULT_FAILURE_WINDOW_MS,
            cooldown_ms: defaults::DEFAULT_COOLDOWN_MS,
        }
    }
}
