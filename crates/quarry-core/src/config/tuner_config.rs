use serde::{Deserialize, Serialize};

use super::defaults;

/// Adaptive tuner configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub analysis_interval_secs: u64,
    /// Rolling window over which rates are computed.
    pub history_window_secs: u64,
    /// Bound on retained workload events.
    pub history_max_events: usize,
    /// Apply recommendations to governor and caches instead of only logging.
    pub auto_apply: bool,
    /// Ingestion rate (docs/min) above which ingestion counts as active.
    pub bulk_ingestion_rate: f64,
    /// Query rate (queries/min) above which querying counts as active.
    pub interactive_query_rate: f64,
    /// Override accelerator detection.
    pub accelerator: Option<bool>,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            analysis_interval_secs: defaults::DEFAULT_ANALYSIS_INTERVAL_SECS,
            history_window_secs: defaults::DEFAULT_HISTORY_WINDOW_SECS,
            history_max_events: defaults::DEFAULT_HISTORY_MAX_EVENTS,
            auto_apply: defaults::DEFAULT_AUTO_APPLY,
            bulk_ingestion_rate: defaults::DEFAULT_BULK_INGESTION_RATE,
            interactive_query_rate: defaults::DEFAULT_INTERACTIVE_QUERY_RATE,
            accelerator: None,
        }
    }
}
