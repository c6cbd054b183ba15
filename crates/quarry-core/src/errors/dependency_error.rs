use crate::models::Dependency;

/// Failures reported by, or about, an external dependency.
#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    /// Retry-eligible: timeout, connection refused, reset.
    #[error("{dependency} transient failure: {reason}")]
    Transient {
        dependency: Dependency,
        reason: String,
    },

    /// Not retried: invalid input, authentication failure.
    #[error("{dependency} rejected request: {reason}")]
    Permanent {
        dependency: Dependency,
        reason: String,
    },

    /// Circuit is open; the call was not attempted.
    #[error("{dependency} unavailable: circuit open")]
    ServiceUnavailable { dependency: Dependency },

    /// Transient failures persisted past the retry limit.
    #[error("{dependency} degraded after {attempts} attempts: {reason}")]
    RetriesExhausted {
        dependency: Dependency,
        attempts: u32,
        reason: String,
    },
}

impl DependencyError {
    /// The dependency this error refers to.
    pub fn dependency(&self) -> Dependency {
        match self {
            Self::Transient { dependency, .. }
            | Self::Permanent { dependency, .. }
            | Self::ServiceUnavailable { dependency }
            | Self::RetriesExhausted { dependency, .. } => *dependency,
        }
    }

    /// Shorthand for a transient failure.
    pub fn transient(dependency: Dependency, reason: impl Into<String>) -> Self {
        Self::Transient {
            dependency,
            reason: reason.into(),
        }
    }

    /// Shorthand for a permanent failure.
    pub fn permanent(dependency: Dependency, reason: impl Into<String>) -> Self {
        Self::Permanent {
            dependency,
            reason: reason.into(),
        }
    }
}
