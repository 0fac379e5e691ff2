//! Semantic retrieval and context assembly.
//!
//! [`RetrievalEngine`] embeds a query, searches the vector index filtered
//! to the active embedding model, ranks results with a recency tolerance
//! band, and packs the winners into a token-budgeted [`Context`] with
//! document provenance.

pub mod context;
pub mod engine;

pub use context::format_context;
pub use engine::{Context, QueryError, RetrievalConfig, RetrievalEngine, RetrievedChunk};
