//! Embedding providers for RetrievIO.
//!
//! The pipeline depends only on the [`Embedder`] trait: a fixed-dimension,
//! deterministic-per-model-version `embed(text) -> Vec<f32>` capability.
//! [`OllamaEmbedder`] is the production implementation; a deterministic
//! [`MockEmbedder`] is available behind the `mock` feature for tests.

use std::future::Future;
use std::time::Duration;

pub mod ollama;

#[cfg(feature = "mock")]
pub mod mock;

pub use ollama::OllamaEmbedder;

#[cfg(feature = "mock")]
pub use mock::MockEmbedder;

const BASE_BACKOFF_MS: u64 = 250;

#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("embedding model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("empty embedding response from {provider}")]
    EmptyResponse { provider: &'static str },

    #[error("{0}")]
    Other(String),
}

impl EmbedError {
    /// Whether another attempt could succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ModelUnavailable(_))
    }
}

pub trait Embedder: Send + Sync {
    /// Embed a text into a fixed-dimension vector.
    ///
    /// # Errors
    ///
    /// Returns an error if the model backend is unreachable or responds
    /// without a vector.
    fn embed(&self, text: &str) -> impl Future<Output = Result<Vec<f32>, EmbedError>> + Send;

    /// Vector width produced by this embedder.
    fn dimension(&self) -> usize;

    /// Identifies the model; entries embedded under a different version
    /// are excluded from search.
    fn model_version(&self) -> &str;

    fn name(&self) -> &'static str;
}

/// Embed with bounded exponential backoff on transient failures.
///
/// Permanent failures are returned immediately; transient ones are retried
/// up to `max_retries` times with `250ms << attempt` delays.
///
/// # Errors
///
/// Returns the last error once attempts are exhausted.
pub async fn embed_with_retry<E: Embedder>(
    embedder: &E,
    text: &str,
    max_retries: u32,
) -> Result<Vec<f32>, EmbedError> {
    let mut attempt = 0;
    loop {
        match embedder.embed(text).await {
            Err(e) if e.is_transient() && attempt < max_retries => {
                let delay = Duration::from_millis(BASE_BACKOFF_MS << attempt);
                tracing::warn!(
                    provider = embedder.name(),
                    "embed failed, retrying in {}ms ({}/{max_retries}): {e}",
                    delay.as_millis(),
                    attempt + 1,
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            result => return result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyEmbedder {
        failures: AtomicU32,
    }

    impl Embedder for FlakyEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            if self.failures.fetch_sub(1, Ordering::SeqCst) > 0 {
                Err(EmbedError::ModelUnavailable("down".into()))
            } else {
                Ok(vec![1.0, 0.0])
            }
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_version(&self) -> &str {
            "flaky-1"
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn retry_recovers_from_transient_failures() {
        let embedder = FlakyEmbedder {
            failures: AtomicU32::new(2),
        };
        let vector = embed_with_retry(&embedder, "hi", 3).await.unwrap();
        assert_eq!(vector.len(), 2);
    }

    #[tokio::test]
    async fn retry_exhausts_and_surfaces_error() {
        let embedder = FlakyEmbedder {
            failures: AtomicU32::new(10),
        };
        let result = embed_with_retry(&embedder, "hi", 1).await;
        assert!(matches!(result, Err(EmbedError::ModelUnavailable(_))));
    }

    struct BrokenEmbedder;

    impl Embedder for BrokenEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            Err(EmbedError::EmptyResponse { provider: "broken" })
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_version(&self) -> &str {
            "broken-1"
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn permanent_failure_not_retried() {
        let result = embed_with_retry(&BrokenEmbedder, "hi", 5).await;
        assert!(matches!(result, Err(EmbedError::EmptyResponse { .. })));
    }

    #[test]
    fn transient_classification() {
        assert!(EmbedError::ModelUnavailable("x".into()).is_transient());
        assert!(!EmbedError::EmptyResponse { provider: "p" }.is_transient());
        assert!(!EmbedError::Other("x".into()).is_transient());
    }
}
