//! Shared types and capability boundaries for the RetrievIO pipeline.
//!
//! Defines the data model flowing through ingestion (documents, chunks,
//! file events), the `DocumentParser` boundary, and the error taxonomy
//! used to decide whether a failure is retried, skipped, or fatal.

pub mod error;
pub mod parser;
pub mod types;

pub use error::ErrorClass;
pub use parser::{DocumentParser, ParseError, TextParser};
pub use types::{
    Chunk, ChunkId, DocId, DocStatus, Document, EmbeddedChunk, FileEvent, FileEventKind, RawText,
    content_hash, estimate_tokens,
};
