mod cache_error;
mod config_error;
mod dependency_error;
mod governor_error;
mod index_error;
mod quarry_error;
mod retrieval_error;
mod storage_error;

pub use cache_error::CacheError;
pub use config_error::ConfigError;
pub use dependency_error::DependencyError;
pub use governor_error::GovernorError;
pub use index_error::IndexError;
pub use quarry_error::{ErrorKind, QuarryError, QuarryResult};
pub use retrieval_error::RetrievalError;
pub use storage_error::StorageError;
