//! SQLite-backed document registry.
//!
//! Persists per-document ingestion state (content hash, status, chunk
//! counts) so idempotence checks and restart reconciliation survive the
//! process. All vector-index mutations are keyed off rows here.

use std::path::PathBuf;
use std::str::FromStr;

use retrievio_core::{DocId, DocStatus, Document};

use crate::error::{IndexError, Result};

/// Handle over the registry pool; cheap to clone.
#[derive(Clone)]
pub struct DocumentRegistry {
    pool: sqlx::SqlitePool,
}

impl std::fmt::Debug for DocumentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentRegistry").finish_non_exhaustive()
    }
}

impl DocumentRegistry {
    /// Open (creating if missing) the registry database and run migrations.
    ///
    /// `path` is a filesystem path or `:memory:`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated; a
    /// migration failure is treated as storage corruption (fatal).
    pub async fn open(path: &str) -> Result<Self> {
        let url = if path == ":memory:" {
            "sqlite::memory:".to_string()
        } else {
            format!("sqlite://{path}")
        };
        let options = sqlx::sqlite::SqliteConnectOptions::from_str(&url)
            .map_err(IndexError::Sqlite)?
            .create_if_missing(true);
        let pool = sqlx::SqlitePool::connect_with(options).await?;
        let registry = Self { pool };
        registry.migrate().await?;
        Ok(registry)
    }

    /// Wrap an existing pool and run migrations. Used by tests.
    ///
    /// # Errors
    ///
    /// Returns an error if migration execution fails.
    pub async fn from_pool(pool: sqlx::SqlitePool) -> Result<Self> {
        let registry = Self { pool };
        registry.migrate().await?;
        Ok(registry)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }

    /// Register or refresh a document row.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn upsert(&self, document: &Document) -> Result<()> {
        sqlx::query(
            "INSERT INTO documents (doc_id, path, content_hash, status, chunk_count, failed_chunks, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, unixepoch()) \
             ON CONFLICT(doc_id) DO UPDATE SET \
               path = excluded.path, \
               content_hash = excluded.content_hash, \
               status = excluded.status, \
               chunk_count = excluded.chunk_count, \
               failed_chunks = excluded.failed_chunks, \
               updated_at = unixepoch()",
        )
        .bind(document.doc_id.as_str())
        .bind(document.path.to_string_lossy().into_owned())
        .bind(&document.content_hash)
        .bind(document.status.as_str())
        .bind(document.chunk_count)
        .bind(document.failed_chunks)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Update only the lifecycle status of a known document.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn set_status(&self, doc_id: &DocId, status: DocStatus) -> Result<()> {
        sqlx::query("UPDATE documents SET status = ?, updated_at = unixepoch() WHERE doc_id = ?")
            .bind(status.as_str())
            .bind(doc_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record a completed ingestion run.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn set_indexed(
        &self,
        doc_id: &DocId,
        content_hash: &str,
        chunk_count: i64,
        failed_chunks: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE documents SET status = 'indexed', content_hash = ?, chunk_count = ?, \
             failed_chunks = ?, updated_at = unixepoch() WHERE doc_id = ?",
        )
        .bind(content_hash)
        .bind(chunk_count)
        .bind(failed_chunks)
        .bind(doc_id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Fetch a document by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn get(&self, doc_id: &DocId) -> Result<Option<Document>> {
        let row: Option<(String, String, String, String, i64, i64)> = sqlx::query_as(
            "SELECT doc_id, path, content_hash, status, chunk_count, failed_chunks \
             FROM documents WHERE doc_id = ?",
        )
        .bind(doc_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(doc_id, path, content_hash, status, chunk_count, failed_chunks)| Document {
                doc_id: DocId::from_raw(doc_id),
                path: PathBuf::from(path),
                content_hash,
                status: DocStatus::parse(&status).unwrap_or(DocStatus::Failed),
                chunk_count,
                failed_chunks,
            },
        ))
    }

    /// Whether the document is already indexed with this exact content.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn is_indexed_unchanged(&self, doc_id: &DocId, content_hash: &str) -> Result<bool> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM documents \
             WHERE doc_id = ? AND content_hash = ? AND status = 'indexed'",
        )
        .bind(doc_id.as_str())
        .bind(content_hash)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 > 0)
    }

    /// Remove a document row entirely (used on delete events).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn remove(&self, doc_id: &DocId) -> Result<()> {
        sqlx::query("DELETE FROM documents WHERE doc_id = ?")
            .bind(doc_id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All paths the registry knows about; reconciliation input.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn known_paths(&self) -> Result<Vec<PathBuf>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT path FROM documents")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(p,)| PathBuf::from(p)).collect())
    }

    /// Whether any document failed or was only partially ingested.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn has_failures(&self) -> Result<bool> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM documents WHERE status = 'failed' OR failed_chunks > 0",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0 > 0)
    }

    /// Number of registered documents.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    async fn setup() -> DocumentRegistry {
        let pool = sqlx::SqlitePool::connect("sqlite::memory:").await.unwrap();
        DocumentRegistry::from_pool(pool).await.unwrap()
    }

    fn doc(path: &str, hash: &str, status: DocStatus) -> Document {
        Document {
            doc_id: DocId::from_path(Path::new(path)),
            path: PathBuf::from(path),
            content_hash: hash.into(),
            status,
            chunk_count: 0,
            failed_chunks: 0,
        }
    }

    #[tokio::test]
    async fn upsert_and_get_round_trip() {
        let registry = setup().await;
        let document = doc("a.txt", "hash1", DocStatus::Parsing);
        registry.upsert(&document).await.unwrap();

        let fetched = registry.get(&document.doc_id).await.unwrap().unwrap();
        assert_eq!(fetched.path, PathBuf::from("a.txt"));
        assert_eq!(fetched.content_hash, "hash1");
        assert_eq!(fetched.status, DocStatus::Parsing);
    }

    #[tokio::test]
    async fn upsert_replaces_existing_row() {
        let registry = setup().await;
        let mut document = doc("a.txt", "hash1", DocStatus::Parsing);
        registry.upsert(&document).await.unwrap();

        document.content_hash = "hash2".into();
        document.status = DocStatus::Indexed;
        registry.upsert(&document).await.unwrap();

        assert_eq!(registry.count().await.unwrap(), 1);
        let fetched = registry.get(&document.doc_id).await.unwrap().unwrap();
        assert_eq!(fetched.content_hash, "hash2");
        assert_eq!(fetched.status, DocStatus::Indexed);
    }

    #[tokio::test]
    async fn is_indexed_unchanged_tracks_hash_and_status() {
        let registry = setup().await;
        let document = doc("a.txt", "hash1", DocStatus::Parsing);
        registry.upsert(&document).await.unwrap();

        assert!(
            !registry
                .is_indexed_unchanged(&document.doc_id, "hash1")
                .await
                .unwrap()
        );

        registry
            .set_indexed(&document.doc_id, "hash1", 3, 0)
            .await
            .unwrap();
        assert!(
            registry
                .is_indexed_unchanged(&document.doc_id, "hash1")
                .await
                .unwrap()
        );
        assert!(
            !registry
                .is_indexed_unchanged(&document.doc_id, "hash2")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn remove_deletes_row() {
        let registry = setup().await;
        let document = doc("a.txt", "hash1", DocStatus::Indexed);
        registry.upsert(&document).await.unwrap();
        registry.remove(&document.doc_id).await.unwrap();
        assert!(registry.get(&document.doc_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn known_paths_lists_all() {
        let registry = setup().await;
        registry
            .upsert(&doc("a.txt", "h1", DocStatus::Indexed))
            .await
            .unwrap();
        registry
            .upsert(&doc("b.txt", "h2", DocStatus::Indexed))
            .await
            .unwrap();

        let mut paths = registry.known_paths().await.unwrap();
        paths.sort();
        assert_eq!(paths, vec![PathBuf::from("a.txt"), PathBuf::from("b.txt")]);
    }

    #[tokio::test]
    async fn has_failures_on_failed_status_or_partial_chunks() {
        let registry = setup().await;
        assert!(!registry.has_failures().await.unwrap());

        registry
            .upsert(&doc("a.txt", "h1", DocStatus::Failed))
            .await
            .unwrap();
        assert!(registry.has_failures().await.unwrap());

        let registry = setup().await;
        let mut partial = doc("b.txt", "h2", DocStatus::Indexed);
        partial.failed_chunks = 2;
        registry.upsert(&partial).await.unwrap();
        assert!(registry.has_failures().await.unwrap());
    }

    #[tokio::test]
    async fn set_status_updates_only_status() {
        let registry = setup().await;
        let document = doc("a.txt", "hash1", DocStatus::Parsing);
        registry.upsert(&document).await.unwrap();

        registry
            .set_status(&document.doc_id, DocStatus::Embedding)
            .await
            .unwrap();
        let fetched = registry.get(&document.doc_id).await.unwrap().unwrap();
        assert_eq!(fetched.status, DocStatus::Embedding);
        assert_eq!(fetched.content_hash, "hash1");
    }

    #[tokio::test]
    async fn get_unknown_returns_none() {
        let registry = setup().await;
        let missing = registry
            .get(&DocId::from_path(Path::new("ghost.txt")))
            .await
            .unwrap();
        assert!(missing.is_none());
    }
}
