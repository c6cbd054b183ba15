mod document_source;
mod embedding;
mod vector_store;

pub use document_source::IDocumentSource;
pub use embedding::IEmbeddingService;
pub use vector_store::IVectorStore;
