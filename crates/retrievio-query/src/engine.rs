//! Query execution: embed, search, rank, pack.

use std::sync::Arc;

use retrievio_core::{ChunkId, estimate_tokens};
use retrievio_embed::{EmbedError, Embedder, embed_with_retry};
use retrievio_index::{
    DocumentRegistry, FieldCondition, FieldValue, IndexError, ScoredEntry, VectorFilter,
    VectorIndex,
};

/// Per-chunk overhead added to the token estimate for provenance framing.
const CHUNK_TOKEN_OVERHEAD: usize = 20;

/// Retrieval configuration.
#[derive(Debug, Clone)]
pub struct RetrievalConfig {
    /// Minimum cosine similarity to accept.
    pub score_threshold: f32,
    /// Scores within this band count as near-equal; the newer entry wins.
    pub recency_tolerance: f32,
    /// Token budget for the assembled context.
    pub max_context_tokens: usize,
    /// Retries for the query embedding call before surfacing failure.
    pub max_embed_retries: u32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            score_threshold: 0.25,
            recency_tolerance: 0.05,
            max_context_tokens: 2048,
            max_embed_retries: 2,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// Query embedding failed after bounded retries.
    #[error("embedding unavailable: {0}")]
    EmbeddingUnavailable(EmbedError),

    #[error("index error: {0}")]
    Index(#[from] IndexError),
}

/// One retrieved chunk with provenance.
#[derive(Debug, Clone)]
pub struct RetrievedChunk {
    pub chunk_id: ChunkId,
    pub doc_path: String,
    pub sequence_index: usize,
    pub text: String,
    pub score: f32,
}

/// Ordered retrieval result for downstream generation.
#[derive(Debug, Clone)]
pub struct Context {
    pub chunks: Vec<RetrievedChunk>,
    /// True when chunks were dropped to fit the token budget.
    pub truncated: bool,
    /// True when the index is known to be partially ingested (failed
    /// documents or chunks), so results may be incomplete.
    pub degraded: bool,
}

impl Context {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Budget-aware retrieval over the vector index.
pub struct RetrievalEngine<E: Embedder> {
    embedder: Arc<E>,
    index: Arc<dyn VectorIndex>,
    registry: DocumentRegistry,
    config: RetrievalConfig,
}

impl<E: Embedder> RetrievalEngine<E> {
    #[must_use]
    pub fn new(
        embedder: Arc<E>,
        index: Arc<dyn VectorIndex>,
        registry: DocumentRegistry,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            registry,
            config,
        }
    }

    /// Answer a natural-language query with ranked, budgeted context.
    ///
    /// Only entries embedded under the engine's current model version are
    /// searched. `file_filter` restricts results to one document path.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::EmbeddingUnavailable`] when the embedder
    /// stays down past the bounded retries, or an index error from search.
    pub async fn query(
        &self,
        text: &str,
        k: usize,
        file_filter: Option<&str>,
    ) -> Result<Context, QueryError> {
        let vector = embed_with_retry(
            self.embedder.as_ref(),
            text,
            self.config.max_embed_retries,
        )
        .await
        .map_err(QueryError::EmbeddingUnavailable)?;

        let mut must = vec![FieldCondition {
            field: "model_version".into(),
            value: FieldValue::Text(self.embedder.model_version().to_string()),
        }];
        if let Some(path) = file_filter {
            must.push(FieldCondition {
                field: "doc_path".into(),
                value: FieldValue::Text(path.to_string()),
            });
        }
        let filter = VectorFilter {
            must,
            must_not: vec![],
        };

        let mut hits = self.index.search(vector, k, Some(filter)).await?;
        hits.retain(|h| h.score >= self.config.score_threshold);
        self.apply_recency_band(&mut hits);

        let degraded = self.registry.has_failures().await?;

        let mut chunks = Vec::with_capacity(hits.len());
        let mut used_tokens = 0usize;
        let mut truncated = false;

        // Hits arrive best-first, so dropping from the tail drops the
        // lowest-scoring chunks first.
        for hit in hits {
            let Some(chunk) = decode_hit(&hit) else {
                tracing::warn!(chunk_id = %hit.chunk_id, "skipping hit with malformed payload");
                continue;
            };
            let cost = estimate_tokens(&chunk.text) + CHUNK_TOKEN_OVERHEAD;
            if used_tokens + cost > self.config.max_context_tokens {
                truncated = true;
                break;
            }
            used_tokens += cost;
            chunks.push(chunk);
        }

        Ok(Context {
            chunks,
            truncated,
            degraded,
        })
    }

    /// Within the tolerance band, near-equal scores favor newer entries.
    fn apply_recency_band(&self, hits: &mut [ScoredEntry]) {
        let tolerance = self.config.recency_tolerance;
        hits.sort_by(|a, b| {
            if (a.score - b.score).abs() <= tolerance {
                b.inserted_at.cmp(&a.inserted_at)
            } else {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            }
        });
    }
}

fn decode_hit(hit: &ScoredEntry) -> Option<RetrievedChunk> {
    let text = hit.payload.get("text")?.as_str()?.to_string();
    let doc_path = hit.payload.get("doc_path")?.as_str()?.to_string();
    let sequence_index = hit
        .payload
        .get("sequence_index")
        .and_then(serde_json::Value::as_u64)
        .and_then(|v| usize::try_from(v).ok())?;

    Some(RetrievedChunk {
        chunk_id: hit.chunk_id.clone(),
        doc_path,
        sequence_index,
        text,
        score: hit.score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;

    use retrievio_core::DocId;
    use retrievio_embed::MockEmbedder;
    use retrievio_index::{IndexEntry, MemoryVectorIndex};

    async fn registry() -> DocumentRegistry {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        DocumentRegistry::from_pool(pool).await.unwrap()
    }

    async fn indexed_entry(
        embedder: &MockEmbedder,
        doc: &str,
        seq: usize,
        text: &str,
    ) -> IndexEntry {
        use retrievio_embed::Embedder as _;
        let doc_id = DocId::from_path(Path::new(doc));
        IndexEntry {
            chunk_id: ChunkId::derive(&doc_id, seq, text),
            doc_id,
            vector: embedder.embed(text).await.unwrap(),
            payload: HashMap::from([
                ("text".to_string(), serde_json::json!(text)),
                ("doc_path".to_string(), serde_json::json!(doc)),
                ("sequence_index".to_string(), serde_json::json!(seq)),
                (
                    "model_version".to_string(),
                    serde_json::json!(embedder.model_version()),
                ),
            ]),
        }
    }

    async fn engine_with_docs(
        docs: &[(&str, &str)],
    ) -> (RetrievalEngine<MockEmbedder>, Arc<MemoryVectorIndex>) {
        let embedder = Arc::new(MockEmbedder::new(64));
        let index = Arc::new(MemoryVectorIndex::new());
        index.ensure_ready(64).await.unwrap();

        let mut entries = Vec::new();
        for (doc, text) in docs {
            entries.push(indexed_entry(&embedder, doc, 0, text).await);
        }
        index.upsert(entries).await.unwrap();

        let engine = RetrievalEngine::new(
            Arc::clone(&embedder),
            Arc::clone(&index) as Arc<dyn VectorIndex>,
            registry().await,
            RetrievalConfig {
                score_threshold: 0.0,
                ..RetrievalConfig::default()
            },
        );
        (engine, index)
    }

    #[tokio::test]
    async fn query_returns_most_relevant_chunk_first() {
        let (engine, _index) = engine_with_docs(&[
            ("a.txt", "The cat sat on the mat."),
            ("b.txt", "Quarterly financial projections."),
        ])
        .await;

        let context = engine.query("cat", 5, None).await.unwrap();
        assert!(!context.is_empty());
        assert_eq!(context.chunks[0].doc_path, "a.txt");
        assert!(!context.truncated);
        assert!(!context.degraded);
    }

    #[tokio::test]
    async fn score_threshold_filters_weak_hits() {
        let embedder = Arc::new(MockEmbedder::new(64));
        let index = Arc::new(MemoryVectorIndex::new());
        index.ensure_ready(64).await.unwrap();
        index
            .upsert(vec![
                indexed_entry(&embedder, "a.txt", 0, "Entirely unrelated words.").await,
            ])
            .await
            .unwrap();

        let engine = RetrievalEngine::new(
            embedder,
            index as Arc<dyn VectorIndex>,
            registry().await,
            RetrievalConfig {
                score_threshold: 0.9,
                ..RetrievalConfig::default()
            },
        );

        let context = engine.query("cat", 5, None).await.unwrap();
        assert!(context.is_empty());
    }

    #[tokio::test]
    async fn file_filter_restricts_results() {
        let (engine, _index) = engine_with_docs(&[
            ("a.txt", "The cat sat here."),
            ("b.txt", "The cat sat there."),
        ])
        .await;

        let context = engine.query("cat", 5, Some("b.txt")).await.unwrap();
        assert!(!context.is_empty());
        assert!(context.chunks.iter().all(|c| c.doc_path == "b.txt"));
    }

    #[tokio::test]
    async fn model_version_mismatch_excluded_from_search() {
        let old_embedder = MockEmbedder::new(64).with_model_version("mock-0");
        let index = Arc::new(MemoryVectorIndex::new());
        index.ensure_ready(64).await.unwrap();
        index
            .upsert(vec![
                indexed_entry(&old_embedder, "a.txt", 0, "The cat sat.").await,
            ])
            .await
            .unwrap();

        let engine = RetrievalEngine::new(
            Arc::new(MockEmbedder::new(64)),
            index as Arc<dyn VectorIndex>,
            registry().await,
            RetrievalConfig {
                score_threshold: 0.0,
                ..RetrievalConfig::default()
            },
        );

        let context = engine.query("cat", 5, None).await.unwrap();
        assert!(context.is_empty());
    }

    #[tokio::test]
    async fn token_budget_drops_lowest_scoring_first() {
        let (engine_base, index) = engine_with_docs(&[
            ("a.txt", "cat cat cat cat cat cat cat cat"),
            ("b.txt", "cat dog dog dog dog dog dog dog"),
        ])
        .await;

        let tight = RetrievalEngine::new(
            Arc::new(MockEmbedder::new(64)),
            index as Arc<dyn VectorIndex>,
            registry().await,
            RetrievalConfig {
                score_threshold: 0.0,
                max_context_tokens: 30,
                ..RetrievalConfig::default()
            },
        );
        drop(engine_base);

        let context = tight.query("cat", 5, None).await.unwrap();
        assert_eq!(context.chunks.len(), 1);
        assert!(context.truncated);
        assert_eq!(context.chunks[0].doc_path, "a.txt");
    }

    #[tokio::test]
    async fn embedding_failure_surfaced_after_retries() {
        let embedder = Arc::new(MockEmbedder::new(64));
        embedder.set_unavailable(true);
        let index: Arc<dyn VectorIndex> = Arc::new(MemoryVectorIndex::new());

        let engine = RetrievalEngine::new(
            embedder,
            index,
            registry().await,
            RetrievalConfig {
                max_embed_retries: 0,
                ..RetrievalConfig::default()
            },
        );

        let result = engine.query("cat", 5, None).await;
        assert!(matches!(result, Err(QueryError::EmbeddingUnavailable(_))));
    }

    #[tokio::test]
    async fn degraded_flag_reflects_registry_failures() {
        use retrievio_core::{DocStatus, Document};
        use std::path::PathBuf;

        let registry = registry().await;
        registry
            .upsert(&Document {
                doc_id: DocId::from_path(Path::new("broken.txt")),
                path: PathBuf::from("broken.txt"),
                content_hash: "h".into(),
                status: DocStatus::Failed,
                chunk_count: 0,
                failed_chunks: 0,
            })
            .await
            .unwrap();

        let embedder = Arc::new(MockEmbedder::new(64));
        let index = Arc::new(MemoryVectorIndex::new());
        index.ensure_ready(64).await.unwrap();

        let engine = RetrievalEngine::new(
            embedder,
            index as Arc<dyn VectorIndex>,
            registry,
            RetrievalConfig::default(),
        );

        let context = engine.query("anything", 5, None).await.unwrap();
        assert!(context.degraded);
        assert!(context.is_empty());
    }

    #[tokio::test]
    async fn near_equal_scores_favor_newer() {
        let embedder = Arc::new(MockEmbedder::new(64));
        let index = Arc::new(MemoryVectorIndex::new());
        index.ensure_ready(64).await.unwrap();

        // Identical text gives identical vectors, hence identical scores;
        // the later insert should rank first.
        index
            .upsert(vec![
                indexed_entry(&embedder, "old.txt", 0, "The cat sat.").await,
            ])
            .await
            .unwrap();
        index
            .upsert(vec![
                indexed_entry(&embedder, "new.txt", 0, "The cat sat.").await,
            ])
            .await
            .unwrap();

        let engine = RetrievalEngine::new(
            embedder,
            index as Arc<dyn VectorIndex>,
            registry().await,
            RetrievalConfig {
                score_threshold: 0.0,
                ..RetrievalConfig::default()
            },
        );

        let context = engine.query("cat", 5, None).await.unwrap();
        assert_eq!(context.chunks[0].doc_path, "new.txt");
    }
}
