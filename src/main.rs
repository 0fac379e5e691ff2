//! RetrievIO: watch a directory, index its documents, answer queries.

mod config;

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

use retrievio_core::{DocumentParser, TextParser};
use retrievio_embed::OllamaEmbedder;
use retrievio_index::{DocumentRegistry, QdrantVectorIndex, VectorIndex};
use retrievio_pipeline::{ChangeWatcher, IngestionPipeline, TextChunker, reconcile};
use retrievio_query::{RetrievalEngine, format_context};

use config::Config;

#[derive(Parser)]
#[command(name = "retrievio", version, about = "Local document RAG pipeline")]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, default_value = "retrievio.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Reconcile the watched directory against the index once and exit.
    Index {
        /// Directory to index (defaults to the configured watch dir).
        dir: Option<PathBuf>,
    },
    /// Reconcile, then follow filesystem events until interrupted.
    Watch {
        /// Directory to watch (defaults to the configured watch dir).
        dir: Option<PathBuf>,
    },
    /// Retrieve context for a query and print it.
    Query {
        /// The natural-language query.
        text: String,
        /// Maximum number of chunks to retrieve.
        #[arg(short = 'k', long, default_value_t = 5)]
        limit: usize,
        /// Restrict results to one document path.
        #[arg(long)]
        file: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Command::Index { dir } => {
            let root = dir.unwrap_or_else(|| config.watch.dir.clone());
            let pipeline = build_pipeline(&config, &root).await?;

            let known = known_abs_paths(pipeline.registry(), &root).await?;
            let events = reconcile(&root, &known, &supported_extensions());
            let report = pipeline.ingest_batch(events).await;

            tracing::info!(
                files_seen = report.files_seen,
                indexed = report.indexed,
                unchanged = report.unchanged,
                deleted = report.deleted,
                failed = report.failed,
                chunks_created = report.chunks_created,
                "indexing complete"
            );
        }
        Command::Watch { dir } => {
            let root = dir.unwrap_or_else(|| config.watch.dir.clone());
            let pipeline = Arc::new(build_pipeline(&config, &root).await?);

            let known = known_abs_paths(pipeline.registry(), &root).await?;
            let events = reconcile(&root, &known, &supported_extensions());
            let seed: HashSet<PathBuf> = events
                .iter()
                .filter(|e| e.path.exists())
                .map(|e| e.path.clone())
                .collect();
            let report = pipeline.ingest_batch(events).await;
            tracing::info!(indexed = report.indexed, "reconciliation complete");

            let (_watcher, rx) = ChangeWatcher::subscribe(
                &root,
                &config.watcher_config(),
                supported_extensions(),
                seed,
            )?;

            let shutdown = CancellationToken::new();
            let runner = tokio::spawn(Arc::clone(&pipeline).run(rx, shutdown.clone()));

            tracing::info!(root = %root.display(), "watching for changes, ctrl-c to stop");
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for ctrl-c")?;
            shutdown.cancel();
            runner.await.context("pipeline task failed")?;
        }
        Command::Query { text, limit, file } => {
            let embedder = Arc::new(OllamaEmbedder::new(
                &config.embedding.base_url,
                config.embedding.model.clone(),
                config.embedding.dimension,
            ));
            let index: Arc<dyn VectorIndex> = Arc::new(QdrantVectorIndex::new(
                &config.index.qdrant_url,
                config.index.collection.clone(),
                config.embedding.dimension,
            )?);
            let registry = DocumentRegistry::open(&config.index.registry_path).await?;

            let engine =
                RetrievalEngine::new(embedder, index, registry, config.retrieval_config());
            let context = engine.query(&text, limit, file.as_deref()).await?;

            if context.is_empty() {
                println!("No relevant passages found.");
            } else {
                print!("{}", format_context(&context));
            }
            if context.degraded {
                eprintln!("note: index is partially ingested; results may be incomplete");
            }
        }
    }

    Ok(())
}

async fn known_abs_paths(
    registry: &DocumentRegistry,
    root: &Path,
) -> anyhow::Result<Vec<PathBuf>> {
    let known = registry.known_paths().await?;
    Ok(known.into_iter().map(|rel| root.join(rel)).collect())
}

fn supported_extensions() -> Vec<String> {
    TextParser::default()
        .supported_extensions()
        .iter()
        .map(|s| (*s).to_string())
        .collect()
}

async fn build_pipeline(
    config: &Config,
    root: &Path,
) -> anyhow::Result<IngestionPipeline<OllamaEmbedder>> {
    let embedder = Arc::new(OllamaEmbedder::new(
        &config.embedding.base_url,
        config.embedding.model.clone(),
        config.embedding.dimension,
    ));
    let index: Arc<dyn VectorIndex> = Arc::new(QdrantVectorIndex::new(
        &config.index.qdrant_url,
        config.index.collection.clone(),
        config.embedding.dimension,
    )?);
    let registry = DocumentRegistry::open(&config.index.registry_path).await?;

    Ok(IngestionPipeline::new(
        root.to_path_buf(),
        Arc::new(TextParser::default()),
        TextChunker::new(config.chunker_config()),
        embedder,
        index,
        registry,
        config.ingest_config(),
    ))
}
