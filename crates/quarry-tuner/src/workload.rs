//! Rolling query and ingestion counters, query latency, and document sizes.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy)]
enum Sample {
    Query,
    /// Documents ingested and their total size, when known.
    Ingest { docs: u64, bytes: Option<u64> },
    /// Wall time of one uncached retrieval.
    Latency(Duration),
}

/// Workload over the window. Averages are 0 when nothing was observed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkloadRates {
    pub queries_per_min: f64,
    pub docs_per_min: f64,
    pub avg_query_latency_ms: f64,
    pub avg_doc_size_bytes: f64,
}

/// Events inside a sliding window, bounded in count.
pub struct WorkloadProfile {
    window: Duration,
    max_events: usize,
    samples: Mutex<VecDeque<(Instant, Sample)>>,
}

impl WorkloadProfile {
    pub fn new(window: Duration, max_events: usize) -> Self {
        Self {
            window: window.max(Duration::from_secs(1)),
            max_events: max_events.max(1),
            samples: Mutex::new(VecDeque::new()),
        }
    }

    pub fn record_query(&self) {
        self.push(Instant::now(), Sample::Query);
    }

    pub fn record_ingestion(&self, docs: usize) {
        if docs > 0 {
            let docs = docs as u64;
            self.push(Instant::now(), Sample::Ingest { docs, bytes: None });
        }
    }

    /// Record ingested documents by size; the count is the number of sizes.
    pub fn record_ingested_sizes<I>(&self, sizes: I)
    where
        I: IntoIterator<Item = usize>,
    {
        let (docs, bytes) = sizes
            .into_iter()
            .fold((0u64, 0u64), |(n, b), size| (n + 1, b + size as u64));
        if docs > 0 {
            self.push(Instant::now(), Sample::Ingest { docs, bytes: Some(bytes) });
        }
    }

    pub fn record_query_latency(&self, latency: Duration) {
        self.push(Instant::now(), Sample::Latency(latency));
    }

    fn push(&self, at: Instant, sample: Sample) {
        let mut samples = self.samples.lock();
        samples.push_back((at, sample));
        while samples.len() > self.max_events {
            samples.pop_front();
        }
    }

    /// Per-minute rates over the window ending now.
    pub fn rates(&self) -> WorkloadRates {
        self.rates_at(Instant::now())
    }

    pub fn rates_at(&self, now: Instant) -> WorkloadRates {
        let mut samples = self.samples.lock();
        while let Some((at, _)) = samples.front() {
            if now.saturating_duration_since(*at) > self.window {
                samples.pop_front();
            } else {
                break;
            }
        }
        let mut queries = 0u64;
        let mut docs = 0u64;
        let (mut sized_docs, mut bytes) = (0u64, 0u64);
        let (mut timed, mut latency) = (0u64, Duration::ZERO);
        for (_, sample) in samples.iter() {
            match sample {
                Sample::Query => queries += 1,
                Sample::Ingest { docs: n, bytes: b } => {
                    docs += n;
                    if let Some(b) = b {
                        sized_docs += n;
                        bytes += b;
                    }
                }
                Sample::Latency(d) => {
                    timed += 1;
                    latency += *d;
                }
            }
        }
        let minutes = self.window.as_secs_f64() / 60.0;
        WorkloadRates {
            queries_per_min: queries as f64 / minutes,
            docs_per_min: docs as f64 / minutes,
            avg_query_latency_ms: average(latency.as_secs_f64() * 1_000.0, timed),
            avg_doc_size_bytes: average(bytes as f64, sized_docs),
        }
    }

    pub fn clear(&self) {
        self.samples.lock().clear();
    }
}

fn average(total: f64, count: u64) -> f64 {
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rates_are_per_minute_over_window() {
        let w = WorkloadProfile::new(Duration::from_secs(120), 1_000);
        for _ in 0..30 {
            w.record_query();
        }
        w.record_ingestion(500);
        let r = w.rates();
        assert_eq!(r.queries_per_min, 15.0);
        assert_eq!(r.docs_per_min, 250.0);
    }

    #[test]
    fn averages_cover_latency_and_document_size() {
        let w = WorkloadProfile::new(Duration::from_secs(60), 1_000);
        assert_eq!(w.rates().avg_query_latency_ms, 0.0);
        w.record_query_latency(Duration::from_millis(10));
        w.record_query_latency(Duration::from_millis(30));
        w.record_ingested_sizes([100, 300]);
        w.record_ingestion(10);
        let r = w.rates();
        assert!((r.avg_query_latency_ms - 20.0).abs() < 1e-9);
        assert_eq!(r.avg_doc_size_bytes, 200.0);
        assert_eq!(r.docs_per_min, 12.0);
        assert_eq!(r.queries_per_min, 0.0);
    }

    #[test]
    fn old_samples_leave_the_window() {
        let w = WorkloadProfile::new(Duration::from_secs(60), 1_000);
        w.record_query();
        let later = Instant::now() + Duration::from_secs(61);
        assert_eq!(w.rates_at(later).queries_per_min, 0.0);
    }

    #[test]
    fn retained_samples_are_bounded() {
        let w = WorkloadProfile::new(Duration::from_secs(60), 10);
        for _ in 0..50 {
            w.record_query();
        }
        assert_eq!(w.rates().queries_per_min, 10.0);
    }
}
