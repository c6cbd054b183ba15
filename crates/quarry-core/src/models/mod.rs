mod cache_key;
mod degradation_event;
mod dependency;
mod document;
mod retrieval;
mod session;

pub use cache_key::{CacheKey, CacheKeyBuilder, CacheScope, CacheTier};
pub use degradation_event::DegradationEvent;
pub use dependency::Dependency;
pub use document::{DocId, Document};
pub use retrieval::{
    Filters, RetrievalMethod, RetrievalRequest, RetrievalResponse, RetrievedPassage, VectorHit,
};
pub use session::{Session, SessionId};
