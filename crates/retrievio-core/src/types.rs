//! Core data model: documents, chunks, and filesystem events.

use std::fmt;
use std::ops::Range;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Stable document identifier derived from the workspace-relative path.
///
/// Deriving the id from the path (rather than assigning a random one) lets
/// restarts and reconciliation map files back to the same document without
/// a lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocId(String);

impl DocId {
    #[must_use]
    pub fn from_path(rel_path: &Path) -> Self {
        let digest = blake3::hash(rel_path.to_string_lossy().as_bytes()).to_hex();
        Self(digest[..32].to_string())
    }

    #[must_use]
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique chunk identifier derived from `(doc_id, sequence_index, text)`.
///
/// A changed document produces chunks with new ids; stale ids are removed
/// as a set, never mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkId(String);

impl ChunkId {
    #[must_use]
    pub fn derive(doc_id: &DocId, sequence_index: usize, text: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(doc_id.as_str().as_bytes());
        hasher.update(&sequence_index.to_le_bytes());
        hasher.update(text.as_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    #[must_use]
    pub fn from_raw(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Blake3 hex digest of raw document bytes, used for change detection.
#[must_use]
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

/// Estimate token count using the chars/4 heuristic.
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4
}

/// Lifecycle status of a document in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocStatus {
    Pending,
    Parsing,
    Chunking,
    Embedding,
    Indexed,
    Failed,
}

impl DocStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Parsing => "parsing",
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::Indexed => "indexed",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "parsing" => Some(Self::Parsing),
            "chunking" => Some(Self::Chunking),
            "embedding" => Some(Self::Embedding),
            "indexed" => Some(Self::Indexed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for DocStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered document: one watched file and its ingestion state.
#[derive(Debug, Clone)]
pub struct Document {
    pub doc_id: DocId,
    pub path: PathBuf,
    pub content_hash: String,
    pub status: DocStatus,
    pub chunk_count: i64,
    pub failed_chunks: i64,
}

/// A contiguous span of a document's text; the retrieval unit.
///
/// Immutable once created. `byte_range` indexes into the parsed text the
/// chunk was cut from.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub chunk_id: ChunkId,
    pub doc_id: DocId,
    pub sequence_index: usize,
    pub text: String,
    pub byte_range: Range<usize>,
}

/// A chunk paired with its embedding vector and the model that produced it.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
    pub model_version: String,
}

/// Parsed document text as produced by a [`crate::DocumentParser`].
#[derive(Debug, Clone)]
pub struct RawText {
    pub text: String,
    pub content_type: String,
}

/// What happened to a watched path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Created,
    Modified,
    Deleted,
    /// The path could not be read or listed; recoverable, never fatal to
    /// the event stream.
    Unreadable,
}

/// A debounced, deduplicated filesystem event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
}

impl FileEvent {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, kind: FileEventKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}
