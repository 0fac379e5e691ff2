//! In-memory vector index for tests and embedded use.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

use retrievio_core::{ChunkId, DocId};

use crate::error::{IndexError, Result};
use crate::vector_index::{IndexEntry, ScoredEntry, VectorFilter, VectorIndex, matches_filter};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

struct StoredEntry {
    doc_id: DocId,
    vector: Vec<f32>,
    payload: HashMap<String, serde_json::Value>,
    inserted_at: u64,
}

/// RwLock-guarded map keyed by chunk id.
///
/// Whole-entry insertion under the write lock gives atomic replace; search
/// clones hits out, so results are stable snapshots.
pub struct MemoryVectorIndex {
    entries: RwLock<HashMap<ChunkId, StoredEntry>>,
    dimension: RwLock<Option<usize>>,
    insert_seq: AtomicU64,
}

impl MemoryVectorIndex {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            dimension: RwLock::new(None),
            insert_seq: AtomicU64::new(0),
        }
    }
}

impl Default for MemoryVectorIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryVectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryVectorIndex").finish_non_exhaustive()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

impl VectorIndex for MemoryVectorIndex {
    fn ensure_ready(&self, dimension: usize) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut dim = self
                .dimension
                .write()
                .map_err(|e| IndexError::Unavailable(e.to_string()))?;
            dim.get_or_insert(dimension);
            Ok(())
        })
    }

    fn upsert(&self, new_entries: Vec<IndexEntry>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let expected = self
                .dimension
                .read()
                .map_err(|e| IndexError::Unavailable(e.to_string()))?
                .ok_or_else(|| IndexError::Unavailable("index not initialized".into()))?;

            for entry in &new_entries {
                if entry.vector.len() != expected {
                    return Err(IndexError::DimensionMismatch {
                        expected,
                        got: entry.vector.len(),
                    });
                }
            }

            let mut entries = self
                .entries
                .write()
                .map_err(|e| IndexError::Unavailable(e.to_string()))?;
            for entry in new_entries {
                let inserted_at = self.insert_seq.fetch_add(1, Ordering::SeqCst);
                entries.insert(
                    entry.chunk_id,
                    StoredEntry {
                        doc_id: entry.doc_id,
                        vector: entry.vector,
                        payload: entry.payload,
                        inserted_at,
                    },
                );
            }
            Ok(())
        })
    }

    fn delete_by_document(&self, doc_id: &DocId) -> BoxFuture<'_, Result<()>> {
        let doc_id = doc_id.clone();
        Box::pin(async move {
            let mut entries = self
                .entries
                .write()
                .map_err(|e| IndexError::Unavailable(e.to_string()))?;
            entries.retain(|_, stored| stored.doc_id != doc_id);
            Ok(())
        })
    }

    fn search(
        &self,
        vector: Vec<f32>,
        k: usize,
        filter: Option<VectorFilter>,
    ) -> BoxFuture<'_, Result<Vec<ScoredEntry>>> {
        Box::pin(async move {
            let entries = self
                .entries
                .read()
                .map_err(|e| IndexError::Unavailable(e.to_string()))?;

            let empty_filter = VectorFilter::default();
            let f = filter.as_ref().unwrap_or(&empty_filter);

            let mut scored: Vec<ScoredEntry> = entries
                .iter()
                .filter(|(_, stored)| matches_filter(&stored.payload, f))
                .map(|(chunk_id, stored)| ScoredEntry {
                    chunk_id: chunk_id.clone(),
                    doc_id: stored.doc_id.clone(),
                    score: cosine_similarity(&vector, &stored.vector),
                    inserted_at: stored.inserted_at,
                    payload: stored.payload.clone(),
                })
                .collect();

            scored.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.inserted_at.cmp(&a.inserted_at))
            });
            scored.truncate(k);
            Ok(scored)
        })
    }

    fn count(&self) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            let entries = self
                .entries
                .read()
                .map_err(|e| IndexError::Unavailable(e.to_string()))?;
            Ok(entries.len())
        })
    }
}
