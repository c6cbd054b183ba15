/// Persistence-layer errors (SQLite cache file, index segment files).
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {message}")]
    Sqlite { message: String },

    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    #[error("corrupted state in {unit}: {details}")]
    CorruptedState { unit: String, details: String },

    #[error("schema version mismatch in {unit}: expected {expected}, found {found}")]
    SchemaMismatch {
        unit: String,
        expected: u32,
        found: u32,
    },
}
