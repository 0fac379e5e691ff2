//! Error types for retrievio-index.

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// Vector width does not match the index dimension.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Storage backend down; callers retry with bounded backoff.
    #[error("index unavailable: {0}")]
    Unavailable(String),

    /// Registry database error.
    #[error("database error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// Registry schema migration failed; treated as storage corruption.
    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Qdrant client construction error.
    #[error("Qdrant error: {0}")]
    Qdrant(#[from] Box<qdrant_client::QdrantError>),

    /// Payload serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using `IndexError`.
pub type Result<T> = std::result::Result<T, IndexError>;
