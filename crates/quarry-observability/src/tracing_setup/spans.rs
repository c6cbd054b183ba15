//! Span definitions per operation: retrieval, ingestion, compaction.

/// Create a retrieval span.
#[macro_export]
macro_rules! retrieval_span {
    ($query:expr, $top_k:expr) => {
        tracing::info_span!("quarry.retrieval", query = %$query, top_k = $top_k)
    };
}

/// Create an ingestion span.
#[macro_export]
macro_rules! ingestion_span {
    ($doc_count:expr) => {
        tracing::info_span!("quarry.ingestion", doc_count = $doc_count)
    };
}

/// Create a compaction span.
#[macro_export]
macro_rules! compaction_span {
    ($from_version:expr) => {
        tracing::info_span!("quarry.compaction", from_version = $from_version)
    };
}

/// Span names as constants for programmatic use.
pub mod names {
    pub const RETRIEVAL: &str = "quarry.retrieval";
    pub const INGESTION: &str = "quarry.ingestion";
    pub const COMPACTION: &str = "quarry.compaction";
}
