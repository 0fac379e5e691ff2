//! Qdrant-backed durable vector index.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};

use qdrant_client::Qdrant;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, CreateFieldIndexCollectionBuilder,
    DeletePointsBuilder, Distance, FieldType, Filter, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, VectorParamsBuilder,
};

use retrievio_core::{ChunkId, DocId};

use crate::error::{IndexError, Result};
use crate::vector_index::{FieldValue, IndexEntry, ScoredEntry, VectorFilter, VectorIndex};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Durable index backed by a Qdrant collection.
///
/// Point ids are UUIDv5 digests of the chunk id, so re-upserting the same
/// chunk replaces the existing point instead of duplicating it.
pub struct QdrantVectorIndex {
    client: Qdrant,
    collection: String,
    dimension: usize,
}

impl QdrantVectorIndex {
    /// # Errors
    ///
    /// Returns an error if the Qdrant client cannot be constructed.
    pub fn new(url: &str, collection: impl Into<String>, dimension: usize) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(Box::new)?;
        Ok(Self {
            client,
            collection: collection.into(),
            dimension,
        })
    }
}

fn point_id(chunk_id: &ChunkId) -> String {
    uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, chunk_id.as_str().as_bytes()).to_string()
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

fn unavailable(e: impl std::fmt::Display) -> IndexError {
    IndexError::Unavailable(e.to_string())
}

fn to_qdrant_filter(filter: &VectorFilter) -> Filter {
    let convert = |conds: &[crate::vector_index::FieldCondition]| -> Vec<Condition> {
        conds
            .iter()
            .map(|c| match &c.value {
                FieldValue::Integer(i) => Condition::matches(c.field.clone(), *i),
                FieldValue::Text(s) => Condition::matches(c.field.clone(), s.clone()),
            })
            .collect()
    };
    Filter {
        must: convert(&filter.must),
        must_not: convert(&filter.must_not),
        ..Filter::default()
    }
}

impl VectorIndex for QdrantVectorIndex {
    fn ensure_ready(&self, dimension: usize) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if dimension != self.dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dimension,
                    got: dimension,
                });
            }

            if self
                .client
                .collection_exists(&self.collection)
                .await
                .map_err(unavailable)?
            {
                return Ok(());
            }

            let size = u64::try_from(self.dimension).unwrap_or(u64::MAX);
            self.client
                .create_collection(
                    CreateCollectionBuilder::new(&self.collection)
                        .vectors_config(VectorParamsBuilder::new(size, Distance::Cosine)),
                )
                .await
                .map_err(unavailable)?;

            for field in ["doc_id", "model_version", "doc_path"] {
                self.client
                    .create_field_index(CreateFieldIndexCollectionBuilder::new(
                        &self.collection,
                        field,
                        FieldType::Keyword,
                    ))
                    .await
                    .map_err(unavailable)?;
            }

            Ok(())
        })
    }

    fn upsert(&self, entries: Vec<IndexEntry>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            for entry in &entries {
                if entry.vector.len() != self.dimension {
                    return Err(IndexError::DimensionMismatch {
                        expected: self.dimension,
                        got: entry.vector.len(),
                    });
                }
            }

            let mut points = Vec::with_capacity(entries.len());
            for entry in entries {
                let mut payload = entry.payload;
                payload.insert("chunk_id".into(), serde_json::json!(entry.chunk_id.as_str()));
                payload.insert("doc_id".into(), serde_json::json!(entry.doc_id.as_str()));
                payload.insert("inserted_at".into(), serde_json::json!(now_ms()));

                let payload: HashMap<String, qdrant_client::qdrant::Value> =
                    serde_json::from_value(serde_json::to_value(payload)?)?;

                points.push(PointStruct::new(
                    point_id(&entry.chunk_id),
                    entry.vector,
                    payload,
                ));
            }

            if points.is_empty() {
                return Ok(());
            }

            self.client
                .upsert_points(UpsertPointsBuilder::new(&self.collection, points))
                .await
                .map_err(unavailable)?;
            Ok(())
        })
    }

    fn delete_by_document(&self, doc_id: &DocId) -> BoxFuture<'_, Result<()>> {
        let doc_id = doc_id.clone();
        Box::pin(async move {
            let filter = Filter::must(vec![Condition::matches(
                "doc_id",
                doc_id.as_str().to_string(),
            )]);
            self.client
                .delete_points(DeletePointsBuilder::new(&self.collection).points(filter))
                .await
                .map_err(unavailable)?;
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
            let mut builder =
                SearchPointsBuilder::new(&self.collection, vector, k as u64).with_payload(true);
            if let Some(f) = filter.as_ref() {
                builder = builder.filter(to_qdrant_filter(f));
            }

            let response = self.client.search_points(builder).await.map_err(unavailable)?;

            let mut results: Vec<ScoredEntry> = response
                .result
                .into_iter()
                .filter_map(|point| {
                    let payload: HashMap<String, serde_json::Value> = point
                        .payload
                        .iter()
                        .filter_map(|(key, value)| {
                            serde_json::to_value(value).ok().map(|v| (key.clone(), v))
                        })
                        .collect();

                    let chunk_id = payload.get("chunk_id")?.as_str()?.to_string();
                    let doc_id = payload.get("doc_id")?.as_str()?.to_string();
                    let inserted_at = payload.get("inserted_at").and_then(
                        serde_json::Value::as_u64,
                    )?;

                    Some(ScoredEntry {
                        chunk_id: ChunkId::from_raw(chunk_id),
                        doc_id: DocId::from_raw(doc_id),
                        score: point.score,
                        inserted_at,
                        payload,
                    })
                })
                .collect();

            results.sort_by(|a, b| {
                b.score
                    .partial_cmp(&a.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(b.inserted_at.cmp(&a.inserted_at))
            });

            Ok(results)
        })
    }

    fn count(&self) -> BoxFuture<'_, Result<usize>> {
        Box::pin(async move {
            let response = self
                .client
                .count(CountPointsBuilder::new(&self.collection).exact(true))
                .await
                .map_err(unavailable)?;
            let count = response.result.map_or(0, |r| r.count);
            Ok(usize::try_from(count).unwrap_or(usize::MAX))
        })
    }
}
