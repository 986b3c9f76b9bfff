//! Embedding providers and the normalizing adapter in front of them.

mod adapter;
mod hashing;
mod openai_compat;
mod provider;

use std::sync::Arc;
use std::time::Duration;

pub use adapter::{Embedder, Embedding};
pub use hashing::HashingProvider;
pub use openai_compat::OpenAiCompatProvider;
pub use provider::EmbeddingProvider;

use crate::core::config::{EmbeddingConfig, EmbeddingProviderKind};
use crate::core::errors::RagError;

pub fn provider_from_config(
    config: &EmbeddingConfig,
) -> Result<Arc<dyn EmbeddingProvider>, RagError> {
    match config.provider {
        EmbeddingProviderKind::Hashing => Ok(Arc::new(HashingProvider::new(config.dimensions))),
        EmbeddingProviderKind::OpenaiCompat => {
            let api_key = config.api_key.clone().or_else(|| {
                config
                    .api_key_env
                    .as_deref()
                    .and_then(|name| std::env::var(name).ok())
                    .filter(|key| !key.trim().is_empty())
            });
            Ok(Arc::new(OpenAiCompatProvider::new(
                config.base_url.clone(),
                config.model.clone(),
                api_key,
            )?))
        }
    }
}

pub fn embedder_from_config(config: &EmbeddingConfig) -> Result<Embedder, RagError> {
    let provider = provider_from_config(config)?;
    Ok(Embedder::new(
        provider,
        config.batch_size,
        Duration::from_secs(config.timeout_secs),
    ))
}
