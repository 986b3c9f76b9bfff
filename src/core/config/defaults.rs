//! Typed configuration sections with their default values.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub ingest: IngestConfig,
    pub embedding: EmbeddingConfig,
    pub tokenizer: TokenizerConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Maximum tokens per chunk
    pub max_tokens: usize,
    /// Documents prepared concurrently during a build
    pub workers: usize,
    /// Skip documents with no tokens instead of aborting the build
    pub skip_empty_documents: bool,
    /// File extensions picked up when loading a documents directory
    pub extensions: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_tokens: 512,
            workers: 4,
            skip_empty_documents: true,
            extensions: vec!["txt".to_string(), "md".to_string()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    Hashing,
    OpenaiCompat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    /// Output dimension of the hashing provider
    pub dimensions: usize,
    pub base_url: String,
    pub model: String,
    /// Inline key, normally supplied through secrets.yml
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is unset
    pub api_key_env: Option<String>,
    pub batch_size: usize,
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::Hashing,
            dimensions: 384,
            base_url: "http://127.0.0.1:1234".to_string(),
            model: "text-embedding-nomic-embed-text-v1.5".to_string(),
            api_key: None,
            api_key_env: Some("DOCRAG_EMBEDDING_API_KEY".to_string()),
            batch_size: 32,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenizerKind {
    Chars,
    Huggingface,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerConfig {
    pub kind: TokenizerKind,
    /// Path to a `tokenizer.json`, required for `huggingface`
    pub path: Option<String>,
}

impl Default for TokenizerConfig {
    fn default() -> Self {
        Self {
            kind: TokenizerKind::Chars,
            path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    /// Results scoring below this are dropped after hydration
    pub min_score: Option<f32>,
    /// Character budget for rendered context
    pub max_context_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            min_score: None,
            max_context_chars: 8000,
        }
    }
}
