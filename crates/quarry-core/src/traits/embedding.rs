use crate::errors::QuarryResult;

/// Embedding-generation collaborator.
///
/// Implementations report failures as `DependencyError::Transient` or
/// `DependencyError::Permanent` so the resilience layer can classify them.
pub trait IEmbeddingService: Send + Sync {
    /// Embed a single text, returning a vector of floats.
    fn embed(&self, text: &str) -> QuarryResult<Vec<f32>>;

    /// Embed a batch of texts. Output order matches input order.
    fn embed_batch(&self, texts: &[String]) -> QuarryResult<Vec<Vec<f32>>>;

    /// The dimensionality of embeddings produced by this service.
    fn dimensions(&self) -> usize;

    /// Identifier mixed into cache keys so vectors from different models never mix.
    fn name(&self) -> &str;
}
