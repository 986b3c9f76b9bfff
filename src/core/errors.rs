use thiserror::Error;

use crate::rag::ServiceState;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("empty input: {context}")]
    EmptyInput { context: String },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("degenerate (zero-norm) embedding at batch position {position}")]
    DegenerateEmbedding { position: usize },

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("unknown row index {row}")]
    UnknownRow { row: usize },

    #[error("row index {row} is already registered")]
    DuplicateRow { row: usize },

    #[error("chunk id {chunk_id:?} is already registered at row {row}")]
    DuplicateChunkId { chunk_id: String, row: usize },

    #[error("retrieval service is not ready (state: {state})")]
    NotReady { state: ServiceState },

    #[error("index is busy: a build is in progress")]
    IndexBusy,

    #[error("embedding call timed out after {timeout_ms} ms")]
    RetrievalTimeout { timeout_ms: u64 },

    #[error("failed to index document {document_id:?}: {source}")]
    Document {
        document_id: String,
        #[source]
        source: Box<RagError>,
    },

    #[error("embedding provider error: {0}")]
    Embedding(String),

    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub fn storage<E: std::fmt::Display>(err: E) -> Self {
        RagError::Storage(err.to_string())
    }

    pub fn embedding<E: std::fmt::Display>(err: E) -> Self {
        RagError::Embedding(err.to_string())
    }

    pub fn tokenizer<E: std::fmt::Display>(err: E) -> Self {
        RagError::Tokenizer(err.to_string())
    }

    /// Wraps a build-time failure with the identifier of the document that caused it.
    pub fn in_document(self, document_id: impl Into<String>) -> Self {
        RagError::Document {
            document_id: document_id.into(),
            source: Box::new(self),
        }
    }
}
