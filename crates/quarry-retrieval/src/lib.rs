//! # quarry-retrieval
//!
//! The externally visible entry point of the retrieval core.
//!
//! [`HybridRetriever::retrieve`] checks the result cache, reserves resources,
//! runs lexical and vector search concurrently behind the resilience layer,
//! and fuses the rankings with weighted RRF. When one method is unavailable
//! the other serves alone and the response is flagged `degraded`.
//!
//! The same instance owns ingestion, removal, recovery, and the admin API.

pub mod admin;
pub mod fusion;
pub mod ingest;
pub mod retriever;

pub use admin::{HealthReport, HealthStatus, InvalidationTarget};
pub use fusion::{fuse, FusedCandidate, FusionWeights};
pub use ingest::{IngestReport, RemovalReport};
pub use retriever::{components, HybridRetriever};
