pub mod defaults;
pub mod paths;
pub mod service;
pub mod validation;

pub use defaults::{
    EmbeddingConfig, EmbeddingProviderKind, IngestConfig, RagConfig, RetrievalConfig,
    TokenizerConfig, TokenizerKind,
};
pub use paths::AppPaths;
pub use service::ConfigService;
