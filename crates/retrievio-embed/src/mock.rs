//! Test-only deterministic embedder.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::{EmbedError, Embedder};

/// Deterministic bag-of-words embedder for tests.
///
/// Each lowercase token is hashed into one of `dimension` buckets and the
/// resulting count vector is L2-normalized, so texts sharing words score
/// high cosine similarity while unrelated texts score near zero. Identical
/// input always produces an identical vector.
#[derive(Debug)]
pub struct MockEmbedder {
    dimension: usize,
    model_version: String,
    unavailable: AtomicBool,
}

impl MockEmbedder {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_version: "mock-1".into(),
            unavailable: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_model_version(mut self, version: impl Into<String>) -> Self {
        self.model_version = version.into();
        self
    }

    /// Toggle simulated backend downtime.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn bucket(&self, token: &str) -> usize {
        // FNV-1a keeps bucket assignment stable across platforms and runs.
        let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
        for byte in token.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(0x0100_0000_01b3);
        }
        usize::try_from(hash % u64::try_from(self.dimension).unwrap_or(1)).unwrap_or(0)
    }
}

impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(EmbedError::ModelUnavailable("mock backend down".into()));
        }

        let mut vector = vec![0.0f32; self.dimension];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            vector[self.bucket(&token.to_lowercase())] += 1.0;
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }

        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cosine(a: &[f32], b: &[f32]) -> f32 {
        a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
    }

    #[tokio::test]
    async fn embedding_is_deterministic() {
        let embedder = MockEmbedder::new(64);
        let a = embedder.embed("the cat sat").await.unwrap();
        let b = embedder.embed("the cat sat").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn shared_words_score_higher_than_disjoint() {
        let embedder = MockEmbedder::new(64);
        let doc = embedder.embed("The cat sat. The dog ran.").await.unwrap();
        let related = embedder.embed("cat").await.unwrap();
        let unrelated = embedder.embed("submarine").await.unwrap();

        assert!(cosine(&doc, &related) > cosine(&doc, &unrelated));
        assert!(cosine(&doc, &related) > 0.2);
    }

    #[tokio::test]
    async fn empty_text_embeds_to_zero_vector() {
        let embedder = MockEmbedder::new(16);
        let vector = embedder.embed("").await.unwrap();
        assert_eq!(vector.len(), 16);
        assert!(vector.iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn vectors_are_normalized() {
        let embedder = MockEmbedder::new(64);
        let vector = embedder.embed("some words here").await.unwrap();
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn unavailable_mode_errors() {
        let embedder = MockEmbedder::new(8);
        embedder.set_unavailable(true);
        let result = embedder.embed("text").await;
        assert!(matches!(result, Err(EmbedError::ModelUnavailable(_))));

        embedder.set_unavailable(false);
        assert!(embedder.embed("text").await.is_ok());
    }

    #[test]
    fn model_version_override() {
        let embedder = MockEmbedder::new(8).with_model_version("mock-2");
        assert_eq!(embedder.model_version(), "mock-2");
    }
}
