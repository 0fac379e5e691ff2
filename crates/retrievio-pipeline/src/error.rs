//! Error types for retrievio-pipeline.

use retrievio_core::{ErrorClass, ParseError};
use retrievio_embed::EmbedError;
use retrievio_index::IndexError;

/// Errors that can occur while watching or ingesting documents.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// IO error reading source files.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parser boundary failure.
    #[error("parse failed: {0}")]
    Parse(#[from] ParseError),

    /// Embedder boundary failure.
    #[error("embedding failed: {0}")]
    Embed(#[from] EmbedError),

    /// Vector index or registry failure.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// Filesystem watcher error.
    #[error("watcher error: {0}")]
    Watch(#[from] notify::Error),
}

impl PipelineError {
    /// Classify for retry/skip/halt handling.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Embed(e) if e.is_transient() => ErrorClass::Transient,
            Self::Index(IndexError::Unavailable(_)) => ErrorClass::Transient,
            Self::Index(IndexError::Sqlite(_) | IndexError::Migration(_)) => ErrorClass::Fatal,
            Self::Io(_) | Self::Parse(_) | Self::Embed(_) | Self::Index(_) | Self::Watch(_) => {
                ErrorClass::PermanentPerItem
            }
        }
    }
}

/// Result type alias using `PipelineError`.
pub type Result<T> = std::result::Result<T, PipelineError>;
