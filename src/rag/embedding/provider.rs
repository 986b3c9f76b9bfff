use async_trait::async_trait;

use crate::core::errors::RagError;

/// External embedding capability.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// return the provider name (e.g. "hashing", "openai_compat")
    fn name(&self) -> &str;

    /// embed each input, one raw vector per input, in input order
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
}
