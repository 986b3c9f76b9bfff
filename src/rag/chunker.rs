//! Token-window chunker.
//!
//! Splits a document's token stream into contiguous, non-overlapping windows
//! of at most `max_tokens` tokens; the last window may be shorter. Windows do
//! not overlap, so no text is repeated between neighbouring chunks.

use std::sync::Arc;

use super::tokenizer::Tokenizer;
use super::types::{chunk_id, Chunk, Document};
use crate::core::errors::RagError;

#[derive(Clone)]
pub struct Chunker {
    tokenizer: Arc<dyn Tokenizer>,
}

impl Chunker {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { tokenizer }
    }

    /// Chunk a document into ordinal-ordered windows.
    ///
    /// Fails with `EmptyInput` when the document has no tokens. Re-running on
    /// the same input yields identical chunks.
    pub fn chunk(&self, document: &Document, max_tokens: usize) -> Result<Vec<Chunk>, RagError> {
        if max_tokens == 0 {
            return Err(RagError::Config(
                "max_tokens must be greater than zero".to_string(),
            ));
        }

        let ids = self.tokenizer.tokenize(&document.content)?;
        if ids.is_empty() {
            return Err(RagError::EmptyInput {
                context: format!("document {:?} has no tokens", document.id),
            });
        }

        let mut chunks = Vec::with_capacity(ids.len().div_ceil(max_tokens));
        for (window_index, window) in ids.chunks(max_tokens).enumerate() {
            let text = self.tokenizer.detokenize(window)?;
            // Windows made only of tokens the tokenizer drops on decode carry no text.
            if text.is_empty() {
                tracing::debug!(
                    document = %document.id,
                    window = window_index,
                    "skipping window that decodes to empty text"
                );
                continue;
            }

            let ordinal = chunks.len();
            chunks.push(Chunk {
                chunk_id: chunk_id(&document.id, ordinal),
                document_id: document.id.clone(),
                ordinal,
                token_offset: window_index * max_tokens,
                token_count: window.len(),
                text,
            });
        }

        if chunks.is_empty() {
            return Err(RagError::EmptyInput {
                context: format!("document {:?} decodes to no text", document.id),
            });
        }

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::tokenizer::CharTokenizer;

    fn chunker() -> Chunker {
        Chunker::new(Arc::new(CharTokenizer))
    }

    /// Drops token 0 on decode, like a tokenizer skipping special tokens.
    struct DroppingTokenizer;

    impl Tokenizer for DroppingTokenizer {
        fn tokenize(&self, text: &str) -> Result<Vec<u32>, RagError> {
            Ok(text
                .chars()
                .map(|c| if c == '#' { 0 } else { u32::from(c) })
                .collect())
        }

        fn detokenize(&self, ids: &[u32]) -> Result<String, RagError> {
            Ok(ids
                .iter()
                .filter(|&&id| id != 0)
                .filter_map(|&id| char::from_u32(id))
                .collect())
        }
    }

    #[test]
    fn splits_600_tokens_into_512_and_88() {
        let doc = Document::new("long", "a".repeat(600));
        let chunks = chunker().chunk(&doc, 512).unwrap();

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].token_count, 512);
        assert_eq!(chunks[1].token_count, 88);
        assert_eq!(chunks[1].token_offset, 512);
        assert_eq!(chunks[0].chunk_id, "long_0");
        assert_eq!(chunks[1].chunk_id, "long_1");
    }

    #[test]
    fn concatenated_chunks_reconstruct_document() {
        let text = "The quick brown fox jumps over the lazy dog.\nÜnïcödé line two 🦊.";
        let doc = Document::new("fox", text);
        for max_tokens in [1, 2, 3, 7, 16, 64, 1000] {
            let chunks = chunker().chunk(&doc, max_tokens).unwrap();
            let rebuilt: String = chunks.iter().map(|c| c.text.as_str()).collect();
            assert_eq!(rebuilt, text, "max_tokens={max_tokens}");
            assert!(chunks.iter().all(|c| c.token_count <= max_tokens));
            assert!(chunks
                .iter()
                .enumerate()
                .all(|(i, c)| c.ordinal == i && !c.text.is_empty()));
        }
    }

    #[test]
    fn chunking_is_restartable() {
        let doc = Document::new("same", "repeatable input ".repeat(40));
        let first = chunker().chunk(&doc, 33).unwrap();
        let second = chunker().chunk(&doc, 33).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn empty_document_is_rejected() {
        let doc = Document::new("blank", "");
        let err = chunker().chunk(&doc, 512).unwrap_err();
        assert!(matches!(err, RagError::EmptyInput { .. }));
        assert!(err.to_string().contains("blank"));
    }

    #[test]
    fn zero_max_tokens_is_a_config_error() {
        let doc = Document::new("d", "text");
        assert!(matches!(
            chunker().chunk(&doc, 0),
            Err(RagError::Config(_))
        ));
    }

    #[test]
    fn windows_decoding_to_nothing_are_skipped_and_ordinals_stay_dense() {
        let chunker = Chunker::new(Arc::new(DroppingTokenizer));
        let doc = Document::new("mixed", "ab####cd");
        let chunks = chunker.chunk(&doc, 2).unwrap();

        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["ab", "cd"]);
        assert_eq!(chunks[1].ordinal, 1);
        assert_eq!(chunks[1].token_offset, 6);
    }

    #[test]
    fn document_that_decodes_to_nothing_is_empty_input() {
        let chunker = Chunker::new(Arc::new(DroppingTokenizer));
        let doc = Document::new("hashes", "####");
        assert!(matches!(
            chunker.chunk(&doc, 2),
            Err(RagError::EmptyInput { .. })
        ));
    }
}
