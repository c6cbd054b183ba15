use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};

use quarry_core::models::RetrievalRequest;
use quarry_core::{CancellationToken, QuarryConfig};
use quarry_retrieval::HybridRetriever;
use quarry_tuner::{AdaptiveTuner, HardwareProfile};
use test_fixtures::{generate_corpus, HashEmbedder, InMemoryVectorStore};

/// 2K docs, result cache off so every iteration runs both searches.
fn build_retriever() -> HybridRetriever {
    let mut config = QuarryConfig::default();
    config.cache.result_cache_enabled = false;
    let tuner = AdaptiveTuner::with_hardware(
        config.tuner.clone(),
        HardwareProfile::new(8, 16_384, 8_192, false),
    );
    let retriever = HybridRetriever::with_tuner(
        config,
        Arc::new(HashEmbedder::new(256)),
        Arc::new(InMemoryVectorStore::new()),
        tuner,
    )
    .unwrap();
    retriever
        .ingest(&generate_corpus(2_000, "needle", 20), &CancellationToken::new())
        .unwrap();
    retriever
}

fn bench_hybrid(c: &mut Criterion) {
    let retriever = build_retriever();
    let request = RetrievalRequest::new("needle harbor signal", 10);
    c.bench_function("hybrid_retrieve_2k_docs", |b| {
        b.iter(|| retriever.retrieve(&request).unwrap());
    });
}

fn bench_fusion(c: &mut Criterion) {
    let lexical: Vec<String> = (0..400).map(|i| format!("doc-{i:04}")).collect();
    let vector: Vec<String> = (200..600).rev().map(|i| format!("doc-{i:04}")).collect();
    c.bench_function("fuse_400x400", |b| {
        b.iter(|| quarry_retrieval::fuse(&lexical, &vector, Default::default()));
    });
}

criterion_group!(benches, bench_hybrid, bench_fusion);
criterion_main!(benches);
