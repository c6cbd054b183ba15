pub mod cache_config;
pub mod defaults;
pub mod governor_config;
pub mod index_config;
pub mod resilience_config;
pub mod retrieval_config;
pub mod tuner_config;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use cache_config::CacheConfig;
pub use governor_config::GovernorConfig;
pub use index_config::IndexConfig;
pub use resilience_config::ResilienceConfig;
pub use retrieval_config::RetrievalConfig;
pub use tuner_config::TunerConfig;

use crate::errors::{ConfigError, QuarryResult};

/// Top-level configuration aggregating every subsystem.
///
/// Every section is optional in TOML; missing sections and fields take the
/// values in [`defaults`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QuarryConfig {
    /// Root for persisted state. `None` keeps everything in memory.
    pub data_dir: Option<PathBuf>,
    pub session_ttl_secs: u64,
    pub cache: CacheConfig,
    pub index: IndexConfig,
    pub governor: GovernorConfig,
    pub resilience: ResilienceConfig,
    pub tuner: TunerConfig,
    pub retrieval: RetrievalConfig,
}

impl Default for QuarryConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            session_ttl_secs: defaults::DEFAULT_SESSION_TTL_SECS,
            cache: CacheConfig::default(),
            index: IndexConfig::default(),
            governor: GovernorConfig::default(),
            resilience: ResilienceConfig::default(),
            tuner: TunerConfig::default(),
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl QuarryConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> QuarryResult<Self> {
        let config: Self = toml::from_str(s).map_err(|e| ConfigError::ParseFailed {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file on disk.
    pub fn load(path: &Path) -> QuarryResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    /// Configuration persisting under `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: Some(data_dir.into()),
            ..Self::default()
        }
    }

    /// Reject values that would make a subsystem misbehave.
    pub fn validate(&self) -> QuarryResult<()> {
        fn invalid(field: &str, reason: &str) -> ConfigError {
            ConfigError::InvalidValue {
                field: field.to_string(),
                reason: reason.to_string(),
            }
        }

        if self.cache.l1_capacity == 0 {
            return Err(invalid("cache.l1_capacity", "must be > 0").into());
        }
        if self.cache.l2_hot_capacity > self.cache.l2_total_capacity {
            return Err(invalid(
                "cache.l2_hot_capacity",
                "must not exceed cache.l2_total_capacity",
            )
            .into());
        }
        if !(0.0..=1.0).contains(&self.index.fragmentation_threshold) {
            return Err(invalid("index.fragmentation_threshold", "must be within 0.0–1.0").into());
        }
        if self.index.segment_max_docs == 0 {
            return Err(invalid("index.segment_max_docs", "must be > 0").into());
        }
        if self.governor.max_concurrent == 0 {
            return Err(invalid("governor.max_concurrent", "must be > 0").into());
        }
        if self.resilience.max_attempts == 0 {
            return Err(invalid("resilience.max_attempts", "must be >= 1").into());
        }
        if self.resilience.failure_threshold == 0 {
            return Err(invalid("resilience.failure_threshold", "must be >= 1").into());
        }
        if !(0.0..=1.0).contains(&self.resilience.jitter_ratio) {
            return Err(invalid("resilience.jitter_ratio", "must be within 0.0–1.0").into());
        }
        if self.retrieval.candidate_multiplier == 0 {
            return Err(invalid("retrieval.candidate_multiplier", "must be > 0").into());
        }
        if self.retrieval.lexical_weight < 0.0 || self.retrieval.vector_weight < 0.0 {
            return Err(invalid("retrieval weights", "must be non-negative").into());
        }
        Ok(())
    }

    /// Directory for the L2 persistent tier, if persistence is on.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.data_dir
            .as_ref()
            .filter(|_| self.cache.l2_persistent)
            .map(|d| d.join("cache"))
    }

    /// Directory for lexical index segments, if persistence is on.
    pub fn index_dir(&self) -> Option<PathBuf> {
        self.data_dir
            .as_ref()
            .filter(|_| self.index.persist)
            .map(|d| d.join("index"))
    }
}
