//! Vector index backends and document registry.
//!
//! The [`VectorIndex`] trait is the single mutation surface for embedded
//! chunks: upsert with replace semantics, cascade delete by document, and
//! cosine k-NN search with recency tie-breaking. [`MemoryVectorIndex`]
//! serves tests and embedded use; [`QdrantVectorIndex`] is the durable
//! backend. [`DocumentRegistry`] persists per-document ingestion state in
//! SQLite so restarts can reconcile missed filesystem events.

pub mod error;
pub mod memory;
pub mod qdrant;
pub mod registry;
pub mod vector_index;

pub use error::{IndexError, Result};
pub use memory::MemoryVectorIndex;
pub use qdrant::QdrantVectorIndex;
pub use registry::DocumentRegistry;
pub use vector_index::{
    FieldCondition, FieldValue, IndexEntry, ScoredEntry, VectorFilter, VectorIndex,
};
