use quarry_core::models::Filters;
use quarry_core::traits::{IEmbeddingService, IVectorStore};
use test_fixtures::{
    generate_corpus, load_corpus, FaultMode, FaultyEmbedder, HashEmbedder, InMemoryVectorStore,
};

#[test]
fn handbook_corpus_loads() {
    let docs = load_corpus("handbook");
    assert_eq!(docs.len(), 12);
    assert!(docs.iter().all(|d| !d.id.is_empty() && !d.text.is_empty()));
}

#[test]
fn generated_corpus_places_marker() {
    let docs = generate_corpus(100, "zeppelin", 10);
    assert_eq!(docs.len(), 100);
    assert_eq!(docs.iter().filter(|d| d.text.contains("zeppelin")).count(), 10);
}

#[test]
fn hash_embedder_is_deterministic_and_normalised() {
    let e = HashEmbedder::new(32);
    let a = e.embed("vector store recovery").unwrap();
    assert_eq!(a, e.embed("Vector STORE recovery").unwrap());
    let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-5);
}

#[test]
fn vector_store_ranks_similar_text_first() {
    let e = HashEmbedder::new(64);
    let store = InMemoryVectorStore::new();
    for (id, text) in [("a", "circuit breaker opens"), ("b", "install on linux")] {
        store
            .upsert(&id.to_string(), &e.vector(text), "c", &Default::default())
            .unwrap();
    }
    let hits = store
        .search(&e.vector("breaker opens"), 5, &Filters::default())
        .unwrap();
    assert_eq!(hits[0].doc_id, "a");
}

#[test]
fn fault_plan_times_out_then_recovers() {
    let e = FaultyEmbedder::new(HashEmbedder::default());
    e.plan().set(FaultMode::TimeoutNext(2));
    assert!(e.embed("x").unwrap_err().is_transient());
    assert!(e.embed("x").is_err());
    assert!(e.embed("x").is_ok());
    assert_eq!(e.plan().calls(), 3);
}
