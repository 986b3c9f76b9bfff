//! Feature-hashing embedding provider.
//!
//! Produces deterministic dense vectors by hashing terms into fixed-dimension
//! buckets weighted by term frequency. Not as semantically rich as a neural
//! model, but needs no network or model files.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::provider::EmbeddingProvider;
use crate::core::errors::RagError;

pub struct HashingProvider {
    dimensions: usize,
}

impl HashingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// FNV-1a bucket for a term.
    fn bucket(term: &str, dims: usize) -> usize {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in term.as_bytes() {
            h ^= *b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        (h % dims as u64) as usize
    }

    fn terms(text: &str) -> Vec<String> {
        let words: Vec<String> = text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase)
            .collect();
        if !words.is_empty() {
            return words;
        }
        // Punctuation- or whitespace-only text still gets a signature.
        text.chars().map(String::from).collect()
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dimensions];
        if self.dimensions == 0 {
            return vec;
        }

        // BTreeMap keeps accumulation order fixed, so output bits are stable.
        let mut tf: BTreeMap<String, f32> = BTreeMap::new();
        for term in Self::terms(text) {
            *tf.entry(term).or_default() += 1.0;
        }

        for (term, count) in &tf {
            let idf = 1.0 + (term.chars().count() as f32).ln();
            vec[Self::bucket(term, self.dimensions)] += count * idf;
        }

        vec
    }
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        Ok(inputs.iter().map(|text| self.vector(text)).collect())
    }
}
