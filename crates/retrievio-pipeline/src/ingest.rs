//! Ingestion orchestration: parse → chunk → embed → index.
//!
//! A dispatcher loop owns the per-document bookkeeping: at most one
//! in-flight run per document, with the latest event for a busy document
//! stashed and re-dispatched on completion (processing always re-reads
//! disk state, so the newest event subsumes older ones). Distinct
//! documents run concurrently on a semaphore-bounded worker pool. A
//! delete arriving mid-run cancels that run cooperatively between stages.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use retrievio_core::{
    DocId, DocStatus, Document, DocumentParser, ErrorClass, FileEvent, FileEventKind, content_hash,
};
use retrievio_embed::{Embedder, embed_with_retry};
use retrievio_index::{DocumentRegistry, IndexEntry, IndexError, VectorIndex};

use crate::chunker::TextChunker;
use crate::error::Result;

const INDEX_BACKOFF_MS: u64 = 250;

/// Ingestion configuration.
#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Concurrent document workers (default: 4).
    pub max_workers: usize,
    /// Retries for index operations when the backend is unavailable.
    pub max_index_retries: u32,
    /// Retries per chunk when the embedder is unavailable.
    pub max_embed_retries: u32,
    /// Fail the whole document on the first chunk embedding failure
    /// instead of degrading to partial ingestion.
    pub abort_on_chunk_failure: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            max_index_retries: 3,
            max_embed_retries: 2,
            abort_on_chunk_failure: false,
        }
    }
}

/// Summary of a batch ingestion run.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub files_seen: usize,
    pub indexed: usize,
    pub unchanged: usize,
    pub deleted: usize,
    pub failed: usize,
    pub chunks_created: usize,
    pub chunks_failed: usize,
}

/// Result of processing one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Indexed {
        created: usize,
        failed_chunks: usize,
    },
    /// Content hash unchanged on an already-indexed document.
    Unchanged,
    Deleted,
    /// Unreadable path or other non-event.
    Skipped,
    /// A delete superseded this run; the queued delete restores the
    /// post-delete state.
    Cancelled,
}

/// Coordinates watcher events through parse, chunk, embed, and index.
pub struct IngestionPipeline<E: Embedder> {
    root: PathBuf,
    parser: Arc<dyn DocumentParser>,
    chunker: TextChunker,
    embedder: Arc<E>,
    index: Arc<dyn VectorIndex>,
    registry: DocumentRegistry,
    config: IngestConfig,
}

impl<E: Embedder + 'static> IngestionPipeline<E> {
    #[must_use]
    pub fn new(
        root: PathBuf,
        parser: Arc<dyn DocumentParser>,
        chunker: TextChunker,
        embedder: Arc<E>,
        index: Arc<dyn VectorIndex>,
        registry: DocumentRegistry,
        config: IngestConfig,
    ) -> Self {
        Self {
            root,
            parser,
            chunker,
            embedder,
            index,
            registry,
            config,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &DocumentRegistry {
        &self.registry
    }

    fn rel_path<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.root).unwrap_or(path)
    }

    /// Process a single event to completion.
    ///
    /// Cancellation is checked between stages; a cancelled run returns
    /// [`Outcome::Cancelled`] without upserting anything.
    ///
    /// # Errors
    ///
    /// Returns an error when parsing, embedding, or indexing fails for
    /// this document; sibling documents are unaffected.
    pub async fn process_event(
        &self,
        event: FileEvent,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let rel = self.rel_path(&event.path);
        let doc_id = DocId::from_path(rel);

        match event.kind {
            FileEventKind::Deleted => {
                self.with_index_retry(|| self.index.delete_by_document(&doc_id))
                    .await?;
                self.registry.remove(&doc_id).await?;
                tracing::info!(path = %rel.display(), "document removed from index");
                Ok(Outcome::Deleted)
            }
            FileEventKind::Unreadable => {
                if self.registry.get(&doc_id).await?.is_some() {
                    self.registry.set_status(&doc_id, DocStatus::Failed).await?;
                }
                tracing::warn!(path = %event.path.display(), "path unreadable, skipping");
                Ok(Outcome::Skipped)
            }
            FileEventKind::Created | FileEventKind::Modified => {
                self.ingest_document(&event.path, rel, &doc_id, cancel).await
            }
        }
    }

    async fn ingest_document(
        &self,
        abs_path: &Path,
        rel: &Path,
        doc_id: &DocId,
        cancel: &CancellationToken,
    ) -> Result<Outcome> {
        let bytes = match tokio::fs::read(abs_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.mark_failed_if_known(doc_id).await?;
                return Err(e.into());
            }
        };
        let hash = content_hash(&bytes);
        drop(bytes);

        if self.registry.is_indexed_unchanged(doc_id, &hash).await? {
            tracing::debug!(path = %rel.display(), "content unchanged, skipping");
            return Ok(Outcome::Unchanged);
        }

        self.registry
            .upsert(&Document {
                doc_id: doc_id.clone(),
                path: rel.to_path_buf(),
                content_hash: hash.clone(),
                status: DocStatus::Parsing,
                chunk_count: 0,
                failed_chunks: 0,
            })
            .await?;

        if cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }

        let raw = match self.parser.parse(abs_path).await {
            Ok(raw) => raw,
            Err(e) => {
                self.registry.set_status(doc_id, DocStatus::Failed).await?;
                tracing::warn!(path = %rel.display(), "parse failed: {e}");
                return Err(e.into());
            }
        };

        self.registry.set_status(doc_id, DocStatus::Chunking).await?;
        let chunks = self.chunker.chunk(doc_id, &raw.text);

        if cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }

        // Purge stale chunks before inserting replacements so old and new
        // content are never visible together.
        self.with_index_retry(|| self.index.delete_by_document(doc_id))
            .await?;

        self.registry.set_status(doc_id, DocStatus::Embedding).await?;
        self.with_index_retry(|| self.index.ensure_ready(self.embedder.dimension()))
            .await?;

        let mut entries = Vec::with_capacity(chunks.len());
        let mut failed_chunks = 0usize;

        for chunk in chunks {
            if cancel.is_cancelled() {
                return Ok(Outcome::Cancelled);
            }
            match embed_with_retry(
                self.embedder.as_ref(),
                &chunk.text,
                self.config.max_embed_retries,
            )
            .await
            {
                Ok(vector) => {
                    let payload = HashMap::from([
                        ("text".to_string(), serde_json::json!(chunk.text)),
                        (
                            "doc_path".to_string(),
                            serde_json::json!(rel.to_string_lossy()),
                        ),
                        (
                            "sequence_index".to_string(),
                            serde_json::json!(chunk.sequence_index),
                        ),
                        (
                            "byte_start".to_string(),
                            serde_json::json!(chunk.byte_range.start),
                        ),
                        (
                            "byte_end".to_string(),
                            serde_json::json!(chunk.byte_range.end),
                        ),
                        (
                            "model_version".to_string(),
                            serde_json::json!(self.embedder.model_version()),
                        ),
                    ]);
                    entries.push(IndexEntry {
                        chunk_id: chunk.chunk_id,
                        doc_id: doc_id.clone(),
                        vector,
                        payload,
                    });
                }
                Err(e) => {
                    if self.config.abort_on_chunk_failure {
                        self.registry.set_status(doc_id, DocStatus::Failed).await?;
                        return Err(e.into());
                    }
                    tracing::warn!(
                        path = %rel.display(),
                        sequence_index = chunk.sequence_index,
                        "chunk embedding failed, degrading to partial ingestion: {e}"
                    );
                    failed_chunks += 1;
                }
            }
        }

        if cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }

        let created = entries.len();
        if let Err(e) = self
            .with_index_retry(|| self.index.upsert(entries.clone()))
            .await
        {
            self.registry.set_status(doc_id, DocStatus::Failed).await?;
            return Err(e.into());
        }

        self.registry
            .set_indexed(
                doc_id,
                &hash,
                i64::try_from(created).unwrap_or(i64::MAX),
                i64::try_from(failed_chunks).unwrap_or(i64::MAX),
            )
            .await?;

        tracing::info!(
            path = %rel.display(),
            created,
            failed_chunks,
            "document indexed"
        );
        Ok(Outcome::Indexed {
            created,
            failed_chunks,
        })
    }

    async fn mark_failed_if_known(&self, doc_id: &DocId) -> Result<()> {
        if self.registry.get(doc_id).await?.is_some() {
            self.registry.set_status(doc_id, DocStatus::Failed).await?;
        }
        Ok(())
    }

    async fn with_index_retry<T, F, Fut>(&self, mut op: F) -> std::result::Result<T, IndexError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, IndexError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(IndexError::Unavailable(msg)) if attempt < self.config.max_index_retries => {
                    let delay = Duration::from_millis(INDEX_BACKOFF_MS << attempt);
                    tracing::warn!(
                        "index unavailable, retrying in {}ms ({}/{}): {msg}",
                        delay.as_millis(),
                        attempt + 1,
                        self.config.max_index_retries
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Process a list of events sequentially, e.g. from reconciliation.
    ///
    /// Per-item failures are counted and logged; a fatal storage error
    /// halts the batch.
    pub async fn ingest_batch(&self, events: Vec<FileEvent>) -> IngestReport {
        let mut report = IngestReport::default();
        let cancel = CancellationToken::new();

        for event in events {
            report.files_seen += 1;
            let path = event.path.clone();
            match self.process_event(event, &cancel).await {
                Ok(Outcome::Indexed {
                    created,
                    failed_chunks,
                }) => {
                    report.indexed += 1;
                    report.chunks_created += created;
                    report.chunks_failed += failed_chunks;
                }
                Ok(Outcome::Unchanged) => report.unchanged += 1,
                Ok(Outcome::Deleted) => report.deleted += 1,
                Ok(Outcome::Skipped | Outcome::Cancelled) => {}
                Err(e) => {
                    report.failed += 1;
                    if e.class() == ErrorClass::Fatal {
                        tracing::error!(path = %path.display(), "fatal storage error, halting ingestion: {e}");
                        break;
                    }
                    tracing::warn!(path = %path.display(), "ingest failed: {e}");
                }
            }
        }

        report
    }

    /// Consume watcher events until the channel closes or `shutdown` fires.
    ///
    /// Documents are processed concurrently up to `max_workers`, with at
    /// most one in-flight run per document; a newer event for a busy
    /// document waits for (and, for deletes, cancels) the current run.
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::Receiver<FileEvent>,
        shutdown: CancellationToken,
    ) {
        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut join_set: JoinSet<DocId> = JoinSet::new();
        let mut inflight: HashMap<DocId, CancellationToken> = HashMap::new();
        let mut pending: HashMap<DocId, FileEvent> = HashMap::new();
        let mut closed = false;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                event = events.recv(), if !closed => {
                    if let Some(event) = event {
                        let doc_id = DocId::from_path(self.rel_path(&event.path));
                        if let Some(token) = inflight.get(&doc_id) {
                            if event.kind == FileEventKind::Deleted {
                                token.cancel();
                            }
                            // Latest wins: the run re-reads disk state, so
                            // the newest event subsumes any earlier stashed
                            // one.
                            pending.insert(doc_id, event);
                        } else {
                            Self::dispatch(&self, &mut join_set, &mut inflight, &semaphore, doc_id, event);
                        }
                    } else {
                        closed = true;
                    }
                }
                Some(finished) = join_set.join_next(), if !join_set.is_empty() => {
                    match finished {
                        Ok(doc_id) => {
                            inflight.remove(&doc_id);
                            if let Some(event) = pending.remove(&doc_id) {
                                Self::dispatch(&self, &mut join_set, &mut inflight, &semaphore, doc_id, event);
                            }
                        }
                        Err(e) => tracing::error!("ingest worker panicked: {e}"),
                    }
                }
            }

            // A pending event always has its document in flight, so an
            // empty join set means nothing is stashed either.
            if closed && join_set.is_empty() {
                break;
            }
        }

        while join_set.join_next().await.is_some() {}
    }

    fn dispatch(
        this: &Arc<Self>,
        join_set: &mut JoinSet<DocId>,
        inflight: &mut HashMap<DocId, CancellationToken>,
        semaphore: &Arc<Semaphore>,
        doc_id: DocId,
        event: FileEvent,
    ) {
        let token = CancellationToken::new();
        inflight.insert(doc_id.clone(), token.clone());
        let pipeline = Arc::clone(this);
        let semaphore = Arc::clone(semaphore);

        join_set.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return doc_id;
            };
            let path = event.path.clone();
            match pipeline.process_event(event, &token).await {
                Ok(outcome) => {
                    tracing::debug!(path = %path.display(), ?outcome, "event processed");
                }
                Err(e) => match e.class() {
                    ErrorClass::Fatal => {
                        tracing::error!(path = %path.display(), "fatal storage error: {e}");
                    }
                    ErrorClass::Transient | ErrorClass::PermanentPerItem => {
                        tracing::warn!(path = %path.display(), "ingest failed: {e}");
                    }
                },
            }
            doc_id
        });
    }
}
