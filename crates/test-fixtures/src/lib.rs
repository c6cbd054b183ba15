//! Deterministic collaborators and corpus fixtures for quarry tests.
//!
//! Everything here is test-only: a hashing embedder, an in-memory vector
//! store, fault-injecting wrappers, and JSON corpus loading.

pub mod corpus;
pub mod embedder;
pub mod faults;
pub mod source;
pub mod vector_store;

use std::path::PathBuf;

use serde::de::DeserializeOwned;

pub use corpus::{generate_corpus, load_corpus};
pub use embedder::HashEmbedder;
pub use faults::{FaultMode, FaultPlan, FaultyEmbedder, FaultyVectorStore};
pub use source::InMemoryDocumentSource;
pub use vector_store::InMemoryVectorStore;

/// Root directory of the bundled fixture files.
pub fn fixtures_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data")
}

/// Load and deserialize a JSON fixture file.
///
/// # Panics
/// Panics if the file doesn't exist or can't be deserialized.
pub fn load_fixture<T: DeserializeOwned>(relative_path: &str) -> T {
    let path = fixtures_root().join(relative_path);
    let content = std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read fixture {}: {}", path.display(), e));
    serde_json::from_str(&content)
        .unwrap_or_else(|e| panic!("Failed to parse fixture {}: {}", path.display(), e))
}

pub fn fixture_exists(relative_path: &str) -> bool {
    fixtures_root().join(relative_path).exists()
}
