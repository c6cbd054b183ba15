use serde::{Deserialize, Serialize};

use super::defaults;

/// Resource governor limits and fairness knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernorConfig {
    pub max_memory_mb: u64,
    pub max_cpu_percent: u32,
    /// Concurrency slots; each reservation holds one.
    pub max_concurrent: usize,
    /// Queue wait after which a request is promoted one priority level.
    pub promotion_after_ms: u64,
    /// Default wait bound for blocking acquisition.
    pub admission_timeout_ms: u64,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: defaults::DEFAULT_MAX_MEMORY_MB,
            max_cpu_percent: defaults::DEFAULT_MAX_CPU_PERCENT,
            max_concurrent: defaults::DEFAULT_MAX_CONCURRENT,
            promotion_after_ms: defaults::DEFAULT_PROMOTION_AFTER_MS,
            admission_timeout_ms: defaults::DEFAULT_ADMISSION_TIMEOUT_MS,
        }
    }
}
