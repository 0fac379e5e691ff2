//! Change watching, chunking, and ingestion orchestration.
//!
//! The ingestion path: [`ChangeWatcher`] feeds debounced filesystem events
//! into a bounded queue; [`IngestionPipeline`] drives each document through
//! parse → chunk → embed → index with at most one in-flight run per
//! document, a bounded worker pool across documents, and cooperative
//! cancellation when a delete supersedes a run in progress.

pub mod chunker;
pub mod error;
pub mod ingest;
pub mod watcher;

pub use chunker::{ChunkerConfig, TextChunker};
pub use error::{PipelineError, Result};
pub use ingest::{IngestConfig, IngestReport, IngestionPipeline, Outcome};
pub use watcher::{ChangeWatcher, WatcherConfig, is_indexable, reconcile};
