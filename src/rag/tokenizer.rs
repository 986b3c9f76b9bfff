//! Tokenizer capability used by the chunker.
//!
//! The chunker only needs token ids for boundary placement and a way to turn
//! a window of ids back into text. Two implementations are provided:
//! - `CharTokenizer`: one token per Unicode scalar value, lossless
//! - `HfTokenizer`: a HuggingFace `tokenizer.json` loaded via `tokenizers`

use std::path::Path;
use std::sync::Arc;

use crate::core::config::{TokenizerConfig, TokenizerKind};
use crate::core::errors::RagError;

pub trait Tokenizer: Send + Sync {
    fn tokenize(&self, text: &str) -> Result<Vec<u32>, RagError>;

    fn detokenize(&self, ids: &[u32]) -> Result<String, RagError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CharTokenizer;

impl Tokenizer for CharTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<u32>, RagError> {
        Ok(text.chars().map(u32::from).collect())
    }

    fn detokenize(&self, ids: &[u32]) -> Result<String, RagError> {
        ids.iter()
            .map(|&id| {
                char::from_u32(id)
                    .ok_or_else(|| RagError::Tokenizer(format!("invalid char token id {id}")))
            })
            .collect()
    }
}

pub struct HfTokenizer {
    inner: tokenizers::Tokenizer,
}

impl HfTokenizer {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RagError> {
        let path = path.as_ref();
        let inner = tokenizers::Tokenizer::from_file(path).map_err(|err| {
            RagError::Tokenizer(format!("failed to load {}: {}", path.display(), err))
        })?;
        Ok(Self { inner })
    }
}

impl Tokenizer for HfTokenizer {
    fn tokenize(&self, text: &str) -> Result<Vec<u32>, RagError> {
        let encoding = self.inner.encode(text, false).map_err(RagError::tokenizer)?;
        Ok(encoding.get_ids().to_vec())
    }

    fn detokenize(&self, ids: &[u32]) -> Result<String, RagError> {
        self.inner.decode(ids, true).map_err(RagError::tokenizer)
    }
}

pub fn tokenizer_from_config(config: &TokenizerConfig) -> Result<Arc<dyn Tokenizer>, RagError> {
    match config.kind {
        TokenizerKind::Chars => Ok(Arc::new(CharTokenizer)),
        TokenizerKind::Huggingface => {
            let path = config.path.as_deref().ok_or_else(|| {
                RagError::Config("tokenizer.path is required for huggingface".to_string())
            })?;
            Ok(Arc::new(HfTokenizer::from_file(path)?))
        }
    }
}
