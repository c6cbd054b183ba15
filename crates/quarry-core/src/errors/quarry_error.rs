use super::{
    CacheError, ConfigError, DependencyError, GovernorError, IndexError, RetrievalError,
    StorageError,
};

/// Top-level error for the quarry retrieval core.
#[derive(Debug, thiserror::Error)]
pub enum QuarryError {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dependency(#[from] DependencyError),

    #[error(transparent)]
    Governor(#[from] GovernorError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type QuarryResult<T> = Result<T, QuarryError>;

/// Error taxonomy used for propagation decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Retry-eligible dependency failure.
    TransientDependency,
    /// Dependency failure that must not be retried.
    PermanentDependency,
    /// Governor cannot satisfy the request.
    ResourceExhausted,
    /// A persisted unit failed its schema or integrity check.
    CorruptedState,
    /// A dependency is circuit-open or exhausted its retries.
    Unavailable,
    /// The operation observed a cancellation signal.
    Cancelled,
    /// Anything else: configuration, invalid input, internal I/O.
    Internal,
}

impl QuarryError {
    /// Classify this error into the propagation taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Dependency(DependencyError::Transient { .. }) => ErrorKind::TransientDependency,
            Self::Dependency(DependencyError::Permanent { .. }) => ErrorKind::PermanentDependency,
            Self::Dependency(
                DependencyError::ServiceUnavailable { .. } | DependencyError::RetriesExhausted { .. },
            ) => ErrorKind::Unavailable,
            Self::Retrieval(RetrievalError::AllMethodsUnavailable) => ErrorKind::Unavailable,
            Self::Governor(GovernorError::ResourceLimitExceeded { .. }) => {
                ErrorKind::ResourceExhausted
            }
            Self::Storage(
                StorageError::CorruptedState { .. } | StorageError::SchemaMismatch { .. },
            ) => ErrorKind::CorruptedState,
            Self::Index(IndexError::Cancelled { .. }) => ErrorKind::Cancelled,
            _ => ErrorKind::Internal,
        }
    }

    /// Whether a retry policy may retry this error.
    pub fn is_transient(&self) -> bool {
        self.kind() == ErrorKind::TransientDependency
    }

    /// Whether the error signals that a dependency should be treated as down.
    pub fn is_unavailable(&self) -> bool {
        self.kind() == ErrorKind::Unavailable
    }
}
