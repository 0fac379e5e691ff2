//! TOML configuration with environment overrides.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use retrievio_pipeline::{ChunkerConfig, IngestConfig, WatcherConfig};
use retrievio_query::RetrievalConfig;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub watch: WatchSection,
    #[serde(default)]
    pub chunker: ChunkerSection,
    #[serde(default)]
    pub embedding: EmbeddingSection,
    #[serde(default)]
    pub index: IndexSection,
    #[serde(default)]
    pub ingest: IngestSection,
    #[serde(default)]
    pub retrieval: RetrievalSection,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct WatchSection {
    #[serde(default = "default_watch_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_watch_dir() -> PathBuf {
    PathBuf::from("documents")
}

fn default_debounce_ms() -> u64 {
    300
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for WatchSection {
    fn default() -> Self {
        Self {
            dir: default_watch_dir(),
            debounce_ms: default_debounce_ms(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ChunkerSection {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
    #[serde(default = "default_overlap_tokens")]
    pub overlap_tokens: usize,
}

fn default_max_tokens() -> usize {
    256
}

fn default_overlap_tokens() -> usize {
    32
}

impl Default for ChunkerSection {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            overlap_tokens: default_overlap_tokens(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EmbeddingSection {
    #[serde(default = "default_embedding_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_model")]
    pub model: String,
    #[serde(default = "default_dimension")]
    pub dimension: usize,
}

fn default_embedding_url() -> String {
    "http://localhost:11434".into()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}

fn default_dimension() -> usize {
    768
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            base_url: default_embedding_url(),
            model: default_embedding_model(),
            dimension: default_dimension(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct IndexSection {
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_registry_path")]
    pub registry_path: String,
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".into()
}

fn default_collection() -> String {
    "retrievio_chunks".into()
}

fn default_registry_path() -> String {
    "retrievio.db".into()
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            collection: default_collection(),
            registry_path: default_registry_path(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct IngestSection {
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_max_index_retries")]
    pub max_index_retries: u32,
    #[serde(default = "default_max_embed_retries")]
    pub max_embed_retries: u32,
    #[serde(default)]
    pub abort_on_chunk_failure: bool,
}

fn default_max_workers() -> usize {
    4
}

fn default_max_index_retries() -> u32 {
    3
}

fn default_max_embed_retries() -> u32 {
    2
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            max_index_retries: default_max_index_retries(),
            max_embed_retries: default_max_embed_retries(),
            abort_on_chunk_failure: false,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RetrievalSection {
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    #[serde(default = "default_recency_tolerance")]
    pub recency_tolerance: f32,
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
}

fn default_score_threshold() -> f32 {
    0.25
}

fn default_recency_tolerance() -> f32 {
    0.05
}

fn default_max_context_tokens() -> usize {
    2048
}

impl Default for RetrievalSection {
    fn default() -> Self {
        Self {
            score_threshold: default_score_threshold(),
            recency_tolerance: default_recency_tolerance(),
            max_context_tokens: default_max_context_tokens(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("RETRIEVIO_WATCH_DIR") {
            self.watch.dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("RETRIEVIO_OLLAMA_URL") {
            self.embedding.base_url = val;
        }
        if let Ok(val) = std::env::var("RETRIEVIO_EMBEDDING_MODEL") {
            self.embedding.model = val;
        }
        if let Ok(val) = std::env::var("RETRIEVIO_QDRANT_URL") {
            self.index.qdrant_url = val;
        }
        if let Ok(val) = std::env::var("RETRIEVIO_REGISTRY_PATH") {
            self.index.registry_path = val;
        }
    }

    #[must_use]
    pub fn watcher_config(&self) -> WatcherConfig {
        WatcherConfig {
            debounce_ms: self.watch.debounce_ms,
            queue_capacity: self.watch.queue_capacity,
        }
    }

    #[must_use]
    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            max_tokens: self.chunker.max_tokens,
            overlap_tokens: self.chunker.overlap_tokens,
        }
    }

    #[must_use]
    pub fn ingest_config(&self) -> IngestConfig {
        IngestConfig {
            max_workers: self.ingest.max_workers,
            max_index_retries: self.ingest.max_index_retries,
            max_embed_retries: self.ingest.max_embed_retries,
            abort_on_chunk_failure: self.ingest.abort_on_chunk_failure,
        }
    }

    #[must_use]
    pub fn retrieval_config(&self) -> RetrievalConfig {
        RetrievalConfig {
            score_threshold: self.retrieval.score_threshold,
            recency_tolerance: self.retrieval.recency_tolerance,
            max_context_tokens: self.retrieval.max_context_tokens,
            max_embed_retries: self.ingest.max_embed_retries,
        }
    }
}
