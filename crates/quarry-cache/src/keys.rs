//! Key construction for each tier.

use quarry_core::models::{CacheKey, CacheScope, RetrievalRequest};

/// Collapse whitespace and case so trivially different spellings share a key.
pub fn normalize_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// L1: (scope, normalized query, embedding model).
pub fn query_key(scope: &CacheScope, model: &str, query: &str) -> CacheKey {
    CacheKey::builder(scope.clone(), "l1.query")
        .part(normalize_query(query))
        .param("model", model)
        .build()
}

/// L2: (document id, content hash, embedding model). Always global scope.
///
/// The content hash is part of the key, so an entry can only ever hold the
/// embedding of exactly that content.
pub fn document_key(doc_id: &str, model: &str, content_hash: &str) -> CacheKey {
    CacheKey::builder(CacheScope::Global, "l2.document")
        .part(doc_id)
        .param("model", model)
        .param("content", content_hash)
        .build()
}

/// L3: the full query descriptor.
pub fn result_key(scope: &CacheScope, request: &RetrievalRequest) -> CacheKey {
    CacheKey::builder(scope.clone(), "l3.result")
        .part(normalize_query(&request.query))
        .param("filters", request.filters.canonical())
        .param("top_k", request.top_k)
        .param("method", request.method)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::models::{Filters, RetrievalMethod};

    #[test]
    fn normalization_merges_spacing_and_case() {
        assert_eq!(normalize_query("  Rust   Ownership "), "rust ownership");
    }

    #[test]
    fn result_key_covers_every_descriptor_field() {
        let base = RetrievalRequest::new("q", 5);
        let k = result_key(&CacheScope::Global, &base);
        let variants = [
            RetrievalRequest::new("q", 6),
            RetrievalRequest::new("q2", 5),
            RetrievalRequest::new("q", 5).with_filters(Filters::collection("c")),
            RetrievalRequest::new("q", 5).with_method(RetrievalMethod::LexicalOnly),
        ];
        for v in &variants {
            assert_ne!(result_key(&CacheScope::Global, v), k);
        }
    }

    #[test]
    fn result_key_keeps_collection_text_apart_from_metadata() {
        let nested = RetrievalRequest::new("orchid", 5)
            .with_filters(Filters::collection("a").with_metadata("x", "1"));
        let flat = RetrievalRequest::new("orchid", 5).with_filters(Filters::collection("a;x=1"));
        assert_ne!(
            result_key(&CacheScope::Global, &nested),
            result_key(&CacheScope::Global, &flat)
        );
    }
}
