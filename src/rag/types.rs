//! Core data types shared across the indexing and retrieval pipeline.
//!
//! - `Document`: an immutable named text
//! - `Chunk`: a bounded token window of one document, produced by the chunker
//! - `ChunkRecord`: what the registry keeps per row index
//! - `RetrievedChunk`: the record handed to downstream context assembly

use serde::{Deserialize, Serialize};

/// A source document. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Stable name, unique within a corpus
    pub id: String,
    /// Raw text content
    pub content: String,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
        }
    }
}

/// A contiguous token window of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// `{document_id}_{ordinal}`
    pub chunk_id: String,
    pub document_id: String,
    /// 0-based position within the document
    pub ordinal: usize,
    /// Offset of the first token in the document's token stream
    pub token_offset: usize,
    /// Number of tokens in the window (never above the configured maximum)
    pub token_count: usize,
    /// Detokenized window text, never empty
    pub text: String,
}

pub fn chunk_id(document_id: &str, ordinal: usize) -> String {
    format!("{}_{}", document_id, ordinal)
}

/// Registry entry for one row of the vector store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub chunk_id: String,
    pub document_id: String,
    pub ordinal: usize,
    pub token_offset: usize,
    pub text: String,
}

impl From<Chunk> for ChunkRecord {
    fn from(chunk: Chunk) -> Self {
        Self {
            chunk_id: chunk.chunk_id,
            document_id: chunk.document_id,
            ordinal: chunk.ordinal,
            token_offset: chunk.token_offset,
            text: chunk.text,
        }
    }
}

/// A ranked retrieval result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub chunk_id: String,
    pub text: String,
    /// Inner product with the query embedding (cosine similarity)
    pub score: f32,
}
