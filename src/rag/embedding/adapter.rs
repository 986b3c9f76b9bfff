//! Uniform contract over an embedding provider: batching, timeouts and
//! L2 normalization.

use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;

use super::provider::EmbeddingProvider;
use crate::core::errors::RagError;

/// A unit-length vector, so inner product equals cosine similarity.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// L2-normalizes a raw vector. Zero, empty or non-finite vectors are rejected.
    pub fn normalized(mut raw: Vec<f32>, position: usize) -> Result<Self, RagError> {
        let norm = raw
            .iter()
            .map(|v| f64::from(*v) * f64::from(*v))
            .sum::<f64>()
            .sqrt();
        if raw.is_empty() || !norm.is_finite() || norm <= f64::from(f32::EPSILON) {
            return Err(RagError::DegenerateEmbedding { position });
        }

        for v in &mut raw {
            *v = (f64::from(*v) / norm) as f32;
        }
        Ok(Self(raw))
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

impl Deref for Embedding {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        &self.0
    }
}

#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    timeout: Duration,
}

impl Embedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize, timeout: Duration) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
            timeout,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    pub async fn embed(&self, text: &str) -> Result<Embedding, RagError> {
        let mut out = self.embed_batch(&[text.to_string()]).await?;
        out.pop()
            .ok_or_else(|| RagError::Embedding("provider returned no embedding".to_string()))
    }

    /// Order- and length-preserving; equivalent to mapping `embed` over `texts`.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>, RagError> {
        let mut embeddings = Vec::with_capacity(texts.len());

        for (batch_index, batch) in texts.chunks(self.batch_size).enumerate() {
            let raw = tokio::time::timeout(self.timeout, self.provider.embed_batch(batch))
                .await
                .map_err(|_| RagError::RetrievalTimeout {
                    timeout_ms: self.timeout.as_millis() as u64,
                })??;

            if raw.len() != batch.len() {
                return Err(RagError::Embedding(format!(
                    "{} returned {} embeddings for {} inputs",
                    self.provider.name(),
                    raw.len(),
                    batch.len()
                )));
            }

            let offset = batch_index * self.batch_size;
            for (i, vector) in raw.into_iter().enumerate() {
                embeddings.push(Embedding::normalized(vector, offset + i)?);
            }
        }

        Ok(embeddings)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::rag::embedding::HashingProvider;

    fn l2(v: &[f32]) -> f32 {
        v.iter().map(|x| x * x).sum::<f32>().sqrt()
    }

    struct ScriptedProvider {
        calls: AtomicUsize,
        delay: Duration,
        zero_for: Option<&'static str>,
        drop_last: bool,
    }

    impl ScriptedProvider {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                zero_for: None,
                drop_last: false,
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let mut out: Vec<Vec<f32>> = inputs
                .iter()
                .map(|text| {
                    if Some(text.as_str()) == self.zero_for {
                        vec![0.0, 0.0, 0.0]
                    } else {
                        vec![text.len() as f32, 3.0, 4.0]
                    }
                })
                .collect();
            if self.drop_last {
                out.pop();
            }
            Ok(out)
        }
    }

    fn embedder(provider: ScriptedProvider, batch_size: usize) -> Embedder {
        Embedder::new(Arc::new(provider), batch_size, Duration::from_secs(5))
    }

    #[test]
    fn normalized_vectors_have_unit_norm() {
        let e = Embedding::normalized(vec![3.0, 4.0], 0).unwrap();
        assert_eq!(e.as_slice(), &[0.6, 0.8]);
        assert!((l2(&e) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn zero_vector_is_degenerate() {
        let err = Embedding::normalized(vec![0.0; 4], 7).unwrap_err();
        assert!(matches!(err, RagError::DegenerateEmbedding { position: 7 }));
    }

    #[test]
    fn empty_and_nan_vectors_are_degenerate() {
        assert!(Embedding::normalized(vec![], 0).is_err());
        assert!(Embedding::normalized(vec![f32::NAN, 1.0], 0).is_err());
    }

    #[tokio::test]
    async fn batch_equals_mapping_single_embed() {
        let embedder = Embedder::new(
            Arc::new(HashingProvider::new(48)),
            2,
            Duration::from_secs(5),
        );
        let texts: Vec<String> = ["one fish", "two fish", "red fish", "blue fish", "!!"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let batched = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(batched.len(), texts.len());
        for (text, embedding) in texts.iter().zip(&batched) {
            assert_eq!(&embedder.embed(text).await.unwrap(), embedding);
            assert!((l2(embedding) - 1.0).abs() < 1e-5);
        }
    }

    #[tokio::test]
    async fn batches_are_split_by_batch_size() {
        let provider = Arc::new(ScriptedProvider::new());
        let embedder = Embedder::new(provider.clone(), 2, Duration::from_secs(5));
        let texts: Vec<String> = (0..5).map(|i| "x".repeat(i + 1)).collect();

        let out = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(out.len(), 5);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn degenerate_position_is_global_across_batches() {
        let mut provider = ScriptedProvider::new();
        provider.zero_for = Some("zero");
        let texts: Vec<String> = ["a", "b", "c", "zero"].iter().map(|s| s.to_string()).collect();

        let err = embedder(provider, 2).embed_batch(&texts).await.unwrap_err();
        assert!(matches!(err, RagError::DegenerateEmbedding { position: 3 }));
    }

    #[tokio::test]
    async fn short_provider_response_is_an_error() {
        let mut provider = ScriptedProvider::new();
        provider.drop_last = true;
        let err = embedder(provider, 8)
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let mut provider = ScriptedProvider::new();
        provider.delay = Duration::from_secs(10);
        let embedder = Embedder::new(Arc::new(provider), 4, Duration::from_millis(20));

        let err = embedder.embed("slow").await.unwrap_err();
        assert!(matches!(err, RagError::RetrievalTimeout { timeout_ms: 20 }));
    }
}
