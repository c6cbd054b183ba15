//! Integration tests for the adaptive tuner.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use proptest::prelude::*;

use quarry_core::config::TunerConfig;
use quarry_tuner::{
    classify, recommend, AdaptiveTuner, HardwareProfile, ITuningTarget, TuningRecommendations,
    WorkloadMode, WorkloadRates,
};

#[derive(Default)]
struct Recorder {
    applied: Mutex<Vec<TuningRecommendations>>,
}

impl ITuningTarget for Recorder {
    fn apply_tuning(&self, recommendations: &TuningRecommendations) {
        self.applied.lock().push(recommendations.clone());
    }
}

fn hardware() -> HardwareProfile {
    HardwareProfile::new(8, 16_384, 8_192, false)
}

fn config(auto_apply: bool) -> TunerConfig {
    TunerConfig {
        history_window_secs: 60,
        auto_apply,
        ..TunerConfig::default()
    }
}

// ── Classification from recorded workload ─────────────────────────────────

#[test]
fn heavy_ingestion_is_classified_as_bulk() {
    let tuner = AdaptiveTuner::with_hardware(config(false), hardware());
    tuner.workload().record_ingestion(500);
    tuner.workload().record_query();
    let rec = tuner.recommendations();
    assert_eq!(rec.mode, WorkloadMode::BulkIngestion);
    assert!(!rec.result_cache_enabled);
    assert_eq!(rec.chunk_size, 1_024);
}

#[test]
fn frequent_queries_are_classified_as_interactive() {
    let tuner = AdaptiveTuner::with_hardware(config(false), hardware());
    for _ in 0..30 {
        tuner.workload().record_query();
    }
    let rec = tuner.recommendations();
    assert_eq!(rec.mode, WorkloadMode::InteractiveQuery);
    assert!(rec.result_cache_enabled);
    assert_eq!(rec.worker_count, 6);
}

#[test]
fn recommendations_report_latency_and_document_size() {
    let tuner = AdaptiveTuner::with_hardware(config(false), hardware());
    tuner.workload().record_query();
    tuner.workload().record_query_latency(Duration::from_millis(4));
    tuner.workload().record_query_latency(Duration::from_millis(8));
    tuner.workload().record_ingested_sizes([1_000, 3_000, 2_000]);
    let rec = tuner.recommendations();
    assert!((rec.rates.avg_query_latency_ms - 6.0).abs() < 1e-9);
    assert_eq!(rec.rates.avg_doc_size_bytes, 2_000.0);
    assert_eq!(rec.rates.docs_per_min, 3.0);
    assert_eq!(rec.rates.queries_per_min, 1.0);
}

#[test]
fn quiet_host_is_idle() {
    let tuner = AdaptiveTuner::with_hardware(config(false), hardware());
    assert_eq!(tuner.recommendations().mode, WorkloadMode::Idle);
}

// ── Apply vs suggest ──────────────────────────────────────────────────────

#[test]
fn suggestions_are_not_applied_without_auto_apply() {
    let tuner = AdaptiveTuner::with_hardware(config(false), hardware());
    let target = Arc::new(Recorder::default());
    tuner.add_target(target.clone());
    let rec = tuner.analyze();
    assert!(target.applied.lock().is_empty());
    assert_eq!(tuner.latest(), Some(rec));
}

#[test]
fn auto_apply_reaches_every_target() {
    let tuner = AdaptiveTuner::with_hardware(config(true), hardware());
    let a = Arc::new(Recorder::default());
    let b = Arc::new(Recorder::default());
    tuner.add_target(a.clone());
    tuner.add_target(b.clone());
    tuner.analyze();
    assert_eq!(a.applied.lock().len(), 1);
    assert_eq!(b.applied.lock().len(), 1);
}

#[test]
fn background_loop_ticks_until_stopped() {
    let tuner = Arc::new(AdaptiveTuner::with_hardware(config(true), hardware()));
    let target = Arc::new(Recorder::default());
    tuner.add_target(target.clone());
    let handle = tuner.spawn_loop_every(Duration::from_millis(5)).unwrap();
    std::thread::sleep(Duration::from_millis(60));
    handle.stop();
    let ticks = target.applied.lock().len();
    assert!(ticks >= 2, "expected several ticks, saw {ticks}");
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(target.applied.lock().len(), ticks);
}

// ── Properties ────────────────────────────────────────────────────────────

fn mode_strategy() -> impl Strategy<Value = WorkloadMode> {
    prop_oneof![
        Just(WorkloadMode::BulkIngestion),
        Just(WorkloadMode::InteractiveQuery),
        Just(WorkloadMode::Mixed),
        Just(WorkloadMode::Idle),
    ]
}

proptest! {
    #[test]
    fn recommendations_respect_bounds(
        cores in 1usize..512,
        memory in 0u64..2_000_000,
        accel in any::<bool>(),
        mode in mode_strategy(),
    ) {
        let hw = HardwareProfile::new(cores, memory, memory, accel);
        let rec = recommend(&hw, mode, WorkloadRates::default());
        prop_assert!((10..=1_000).contains(&rec.batch_size));
        prop_assert!((50..=10_000).contains(&rec.cache_size));
        prop_assert!(rec.worker_count >= 1 && rec.worker_count <= cores);
        prop_assert_eq!(rec.result_cache_enabled, mode != WorkloadMode::BulkIngestion);
    }

    #[test]
    fn more_memory_never_shrinks_batches(low in 0u64..100_000, extra in 0u64..100_000, mode in mode_strategy()) {
        let small = recommend(&HardwareProfile::new(4, low, low, false), mode, WorkloadRates::default());
        let big = recommend(&HardwareProfile::new(4, low + extra, low + extra, false), mode, WorkloadRates::default());
        prop_assert!(big.batch_size >= small.batch_size);
        prop_assert!(big.cache_size >= small.cache_size);
    }

    #[test]
    fn classification_is_total(q in 0.0f64..1_000.0, d in 0.0f64..10_000.0) {
        let mode = classify(
            &WorkloadRates { queries_per_min: q, docs_per_min: d, ..WorkloadRates::default() },
            &TunerConfig::default(),
        );
        let ingesting = d > 50.0;
        let querying = q > 10.0;
        let expected = match (ingesting, querying) {
            (true, false) => WorkloadMode::BulkIngestion,
            (false, true) => WorkloadMode::InteractiveQuery,
            (true, true) => WorkloadMode::Mixed,
            (false, false) => WorkloadMode::Idle,
        };
        prop_assert_eq!(mode, expected);
    }
}
