//! # quarry-core
//!
//! Foundation crate for the quarry retrieval core.
//! Defines shared types, traits, errors, config, and constants.
//! Every other crate in the workspace depends on this.

pub mod cancel;
pub mod config;
pub mod constants;
pub mod errors;
pub mod models;
pub mod traits;

// Re-export the most commonly used types at the crate root.
pub use cancel::CancellationToken;
pub use config::QuarryConfig;
pub use errors::{ErrorKind, QuarryError, QuarryResult};
pub use models::{
    CacheKey, CacheScope, CacheTier, Dependency, DocId, Document, Filters, RetrievalMethod,
    RetrievalRequest, RetrievalResponse, RetrievedPassage, Session, SessionId,
};
