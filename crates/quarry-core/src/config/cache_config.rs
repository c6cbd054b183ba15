use serde::{Deserialize, Serialize};

use super::defaults;

/// Multi-tier cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// L1 query-embedding cache max entries.
    pub l1_capacity: u64,
    /// L2 in-memory hot set max entries.
    pub l2_hot_capacity: u64,
    /// L2 total entries kept in persistent storage.
    pub l2_total_capacity: u64,
    /// Back L2 with an on-disk store when a data dir is configured.
    pub l2_persistent: bool,
    /// L3 result cache max entries.
    pub l3_capacity: u64,
    /// L3 time-to-live in seconds.
    pub l3_ttl_secs: u64,
    /// Whether L3 is consulted at all.
    pub result_cache_enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            l1_capacity: defaults::DEFAULT_L1_CAPACITY,
            l2_hot_capacity: defaults::DEFAULT_L2_HOT_CAPACITY,
            l2_total_capacity: defaults::DEFAULT_L2_TOTAL_CAPACITY,
            l2_persistent: defaults::DEFAULT_L2_PERSISTENT,
            l3_capacity: defaults::DEFAULT_L3_CAPACITY,
            l3_ttl_secs: defaults::DEFAULT_L3_TTL_SECS,
            result_cache_enabled: defaults::DEFAULT_RESULT_CACHE_ENABLED,
        }
    }
}
