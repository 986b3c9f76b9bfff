//! Document indexing and retrieval.
//!
//! - `Chunker`: splits documents into bounded token windows
//! - `Embedder`: normalizing adapter over an `EmbeddingProvider`
//! - `VectorStore`: exact inner-product index
//! - `ChunkRegistry`: row index → chunk text and provenance
//! - `RetrievalService`: builds the index and answers queries

pub mod chunker;
pub mod context_builder;
pub mod documents;
pub mod embedding;
pub mod registry;
pub mod service;
pub mod snapshot;
mod sqlite;
pub mod tokenizer;
pub mod types;
pub mod vector_store;


pub use chunker::Chunker;
pub use context_builder::render_context;
pub use documents::load_documents;
pub use embedding::{Embedder, Embedding, EmbeddingProvider};
pub use registry::ChunkRegistry;
pub use service::{
    BuildReport, QueryResponse, QueryStatus, RetrievalService, ServiceSettings, ServiceState,
    ServiceStats,
};
pub use tokenizer::{tokenizer_from_config, CharTokenizer, HfTokenizer, Tokenizer};
pub use types::{Chunk, ChunkRecord, Document, RetrievedChunk};
pub use vector_store::{SearchHit, VectorStore};
