//! The `VectorIndex` trait and its wire types.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use retrievio_core::{ChunkId, DocId};

use crate::error::Result;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One embedded chunk ready for storage, keyed by `chunk_id`.
///
/// Carries the owning `doc_id` for cascade delete and a JSON payload with
/// everything retrieval needs back (text, provenance, model version).
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk_id: ChunkId,
    pub doc_id: DocId,
    pub vector: Vec<f32>,
    pub payload: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default)]
pub struct VectorFilter {
    pub must: Vec<FieldCondition>,
    pub must_not: Vec<FieldCondition>,
}

#[derive(Debug, Clone)]
pub struct FieldCondition {
    pub field: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone)]
pub enum FieldValue {
    Integer(i64),
    Text(String),
}

/// A search hit: chunk identity, similarity score, and insertion recency.
#[derive(Debug, Clone)]
pub struct ScoredEntry {
    pub chunk_id: ChunkId,
    pub doc_id: DocId,
    pub score: f32,
    /// Monotonic insertion marker (sequence number or wall-clock millis,
    /// backend-dependent); used only for relative ordering.
    pub inserted_at: u64,
    pub payload: HashMap<String, serde_json::Value>,
}

/// Queryable store of embedded chunks.
///
/// All implementations guarantee replace semantics per `chunk_id` (never
/// two live entries for the same id) and atomic per-entry visibility: a
/// concurrent search observes an entry either before or after an update,
/// never a partially written vector. Search results are owned snapshots, so
/// callers holding them are unaffected by later mutations.
pub trait VectorIndex: Send + Sync {
    /// Prepare backing storage for vectors of the given width. Idempotent.
    fn ensure_ready(&self, dimension: usize) -> BoxFuture<'_, Result<()>>;

    /// Insert entries, replacing any existing entry with the same
    /// `chunk_id`. Fails with `DimensionMismatch` before writing anything
    /// if a vector has the wrong width.
    fn upsert(&self, entries: Vec<IndexEntry>) -> BoxFuture<'_, Result<()>>;

    /// Remove every entry owned by `doc_id`. Unknown documents are a
    /// no-op, not an error.
    fn delete_by_document(&self, doc_id: &DocId) -> BoxFuture<'_, Result<()>>;

    /// Cosine k-nearest-neighbor search, descending score, exact ties
    /// broken by insertion recency (newer first). Returns fewer than `k`
    /// results only when fewer eligible entries exist.
    fn search(
        &self,
        vector: Vec<f32>,
        k: usize,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredEntry>>>;

    /// Number of live entries.
    fn count(&self) -> BoxFuture<'_, Result<usize>>;
}

pub(crate) fn matches_filter(
    payload: &HashMap<String, serde_json::Value>,
    filter: &VectorFilter,
) -> bool {
    for cond in &filter.must {
        let Some(val) = payload.get(&cond.field) else {
            return false;
        };
        if !field_matches(val, &cond.value) {
            return false;
        }
    }
    for cond in &filter.must_not {
        if let Some(val) = payload.get(&cond.field)
            && field_matches(val, &cond.value)
        {
            return false;
        }
    }
    true
}

fn field_matches(val: &serde_json::Value, expected: &FieldValue) -> bool {
    match expected {
        FieldValue::Integer(i) => val.as_i64() == Some(*i),
        FieldValue::Text(s) => val.as_str() == Some(s.as_str()),
    }
}
