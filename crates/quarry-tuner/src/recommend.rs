//! Mode classification and the recommendation table.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quarry_core::config::TunerConfig;

use crate::hardware::HardwareProfile;
use crate::workload::WorkloadRates;

pub const MIN_BATCH_SIZE: usize = 10;
pub const MAX_BATCH_SIZE: usize = 1_000;
pub const MIN_CACHE_SIZE: u64 = 50;
pub const MAX_CACHE_SIZE: u64 = 10_000;

/// Memory at which the per-mode bases apply unscaled.
const REFERENCE_MEMORY_MB: f64 = 4_096.0;
/// Text held by one embedding batch at the reference memory.
const BATCH_BYTE_BUDGET: f64 = 8.0 * 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadMode {
    BulkIngestion,
    InteractiveQuery,
    Mixed,
    Idle,
}

impl fmt::Display for WorkloadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::BulkIngestion => "bulk_ingestion",
            Self::InteractiveQuery => "interactive_query",
            Self::Mixed => "mixed",
            Self::Idle => "idle",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TuningRecommendations {
    pub mode: WorkloadMode,
    pub batch_size: usize,
    pub cache_size: u64,
    pub worker_count: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub result_cache_enabled: bool,
    pub rates: WorkloadRates,
    pub hardware: HardwareProfile,
    pub generated_at: DateTime<Utc>,
}

pub fn classify(rates: &WorkloadRates, config: &TunerConfig) -> WorkloadMode {
    let ingesting = rates.docs_per_min > config.bulk_ingestion_rate;
    let querying = rates.queries_per_min > config.interactive_query_rate;
    match (ingesting, querying) {
        (true, false) => WorkloadMode::BulkIngestion,
        (false, true) => WorkloadMode::InteractiveQuery,
        (true, true) => WorkloadMode::Mixed,
        (false, false) => WorkloadMode::Idle,
    }
}

pub fn recommend(
    hardware: &HardwareProfile,
    mode: WorkloadMode,
    rates: WorkloadRates,
) -> TuningRecommendations {
    let memory_factor = (hardware.available_memory_mb as f64 / REFERENCE_MEMORY_MB).clamp(0.25, 4.0);

    let (batch_base, cache_base, chunk_size, chunk_overlap) = match mode {
        WorkloadMode::BulkIngestion => (256.0, 200.0, 1_024, 128),
        WorkloadMode::InteractiveQuery => (32.0, 2_500.0, 512, 64),
        WorkloadMode::Mixed => (128.0, 1_000.0, 768, 96),
        WorkloadMode::Idle => (64.0, 500.0, 512, 64),
    };
    let accelerator_factor = if hardware.accelerator { 2.0 } else { 1.0 };

    let mut batch = batch_base * memory_factor * accelerator_factor;
    if rates.avg_doc_size_bytes > 0.0 {
        batch = batch.min(BATCH_BYTE_BUDGET * memory_factor / rates.avg_doc_size_bytes);
    }
    let batch_size = (batch.round() as usize).clamp(MIN_BATCH_SIZE, MAX_BATCH_SIZE);
    let cache_size = ((cache_base * memory_factor).round() as u64).clamp(MIN_CACHE_SIZE, MAX_CACHE_SIZE);
    let worker_count = ((hardware.cpu_cores as f64 * 0.75).round() as usize).max(1);

    TuningRecommendations {
        mode,
        batch_size,
        cache_size,
        worker_count,
        chunk_size,
        chunk_overlap,
        result_cache_enabled: mode != WorkloadMode::BulkIngestion,
        rates,
        hardware: hardware.clone(),
        generated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates(q: f64, d: f64) -> WorkloadRates {
        WorkloadRates {
            queries_per_min: q,
            docs_per_min: d,
            ..WorkloadRates::default()
        }
    }

    #[test]
    fn classification_follows_thresholds() {
        let c = TunerConfig::default();
        assert_eq!(classify(&rates(0.0, 100.0), &c), WorkloadMode::BulkIngestion);
        assert_eq!(classify(&rates(20.0, 0.0), &c), WorkloadMode::InteractiveQuery);
        assert_eq!(classify(&rates(20.0, 100.0), &c), WorkloadMode::Mixed);
        assert_eq!(classify(&rates(10.0, 50.0), &c), WorkloadMode::Idle);
    }

    #[test]
    fn bulk_mode_disables_result_cache_and_uses_large_chunks() {
        let hw = HardwareProfile::new(8, 16_384, 4_096, false);
        let bulk = recommend(&hw, WorkloadMode::BulkIngestion, WorkloadRates::default());
        let interactive = recommend(&hw, WorkloadMode::InteractiveQuery, WorkloadRates::default());
        assert!(!bulk.result_cache_enabled);
        assert!(interactive.result_cache_enabled);
        assert!(bulk.chunk_size > interactive.chunk_size);
        assert!(bulk.batch_size > interactive.batch_size);
        assert!(interactive.cache_size > bulk.cache_size);
        assert_eq!(bulk.worker_count, 6);
    }

    #[test]
    fn large_documents_shrink_batches() {
        let hw = HardwareProfile::new(8, 16_384, 4_096, false);
        let small_docs = WorkloadRates {
            avg_doc_size_bytes: 2_000.0,
            ..WorkloadRates::default()
        };
        let large_docs = WorkloadRates {
            avg_doc_size_bytes: 256.0 * 1024.0,
            ..WorkloadRates::default()
        };
        let small = recommend(&hw, WorkloadMode::BulkIngestion, small_docs);
        let large = recommend(&hw, WorkloadMode::BulkIngestion, large_docs);
        assert_eq!(small.batch_size, 256);
        assert_eq!(large.batch_size, 32);
        let huge = WorkloadRates {
            avg_doc_size_bytes: 64.0 * 1024.0 * 1024.0,
            ..WorkloadRates::default()
        };
        assert_eq!(recommend(&hw, WorkloadMode::BulkIngestion, huge).batch_size, MIN_BATCH_SIZE);
    }

    #[test]
    fn outputs_stay_in_range_on_extreme_hosts() {
        let tiny = HardwareProfile::new(1, 256, 64, false);
        let huge = HardwareProfile::new(256, 1 << 20, 1 << 20, true);
        for mode in [
            WorkloadMode::BulkIngestion,
            WorkloadMode::InteractiveQuery,
            WorkloadMode::Mixed,
            WorkloadMode::Idle,
        ] {
            for hw in [&tiny, &huge] {
                let r = recommend(hw, mode, WorkloadRates::default());
                assert!((MIN_BATCH_SIZE..=MAX_BATCH_SIZE).contains(&r.batch_size));
                assert!((MIN_CACHE_SIZE..=MAX_CACHE_SIZE).contains(&r.cache_size));
                assert!(r.worker_count >= 1);
            }
        }
    }
}
