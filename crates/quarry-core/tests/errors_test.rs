use quarry_core::errors::*;
use quarry_core::Dependency;

#[test]
fn transient_dependency_error_is_retry_eligible() {
    let err: QuarryError = DependencyError::transient(Dependency::VectorStore, "timeout").into();
    assert_eq!(err.kind(), ErrorKind::TransientDependency);
    assert!(err.is_transient());
    assert!(err.to_string().contains("vector_store"));
    assert!(err.to_string().contains("timeout"));
}

#[test]
fn permanent_dependency_error_is_not_retried() {
    let err: QuarryError = DependencyError::permanent(Dependency::Embedding, "bad input").into();
    assert_eq!(err.kind(), ErrorKind::PermanentDependency);
    assert!(!err.is_transient());
}

#[test]
fn open_circuit_and_exhausted_retries_are_unavailable() {
    let open: QuarryError = DependencyError::ServiceUnavailable {
        dependency: Dependency::VectorStore,
    }
    .into();
    let exhausted: QuarryError = DependencyError::RetriesExhausted {
        dependency: Dependency::VectorStore,
        attempts: 3,
        reason: "timeout".into(),
    }
    .into();
    assert!(open.is_unavailable());
    assert!(exhausted.is_unavailable());
    assert!(exhausted.to_string().contains("3 attempts"));
}

#[test]
fn resource_limit_exceeded_carries_values() {
    let err: QuarryError = GovernorError::ResourceLimitExceeded {
        resource: "memory_mb",
        requested: 10_240,
        limit: 8_192,
    }
    .into();
    assert_eq!(err.kind(), ErrorKind::ResourceExhausted);
    let msg = err.to_string();
    assert!(msg.contains("10240"));
    assert!(msg.contains("8192"));
}

#[test]
fn storage_integrity_failures_are_corrupted_state() {
    let corrupt: QuarryError = StorageError::CorruptedState {
        unit: "segment-3".into(),
        details: "bad json".into(),
    }
    .into();
    let mismatch: QuarryError = StorageError::SchemaMismatch {
        unit: "manifest".into(),
        expected: 1,
        found: 7,
    }
    .into();
    assert_eq!(corrupt.kind(), ErrorKind::CorruptedState);
    assert_eq!(mismatch.kind(), ErrorKind::CorruptedState);
}

#[test]
fn cancellation_and_misc_errors_classify() {
    let cancelled: QuarryError = IndexError::Cancelled {
        operation: "compaction".into(),
    }
    .into();
    assert_eq!(cancelled.kind(), ErrorKind::Cancelled);

    let all_down: QuarryError = RetrievalError::AllMethodsUnavailable.into();
    assert_eq!(all_down.kind(), ErrorKind::Unavailable);

    let session: QuarryError = RetrievalError::SessionNotFound {
        session_id: "abc".into(),
    }
    .into();
    assert_eq!(session.kind(), ErrorKind::Internal);
}

#[test]
fn dependency_accessor_returns_source() {
    let err = DependencyError::ServiceUnavailable {
        dependency: Dependency::Generation,
    };
    assert_eq!(err.dependency(), Dependency::Generation);
}
