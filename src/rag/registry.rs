//! Row-index → chunk mapping.
//!
//! Keeps row_index ↔ chunk_id a bijection: neither a row nor a chunk id may be
//! registered twice. Persistence lives in `sqlite.rs`.

use std::collections::{BTreeMap, HashMap};

use super::types::ChunkRecord;
use crate::core::errors::RagError;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkRegistry {
    by_row: BTreeMap<usize, ChunkRecord>,
    row_by_chunk_id: HashMap<String, usize>,
}

impl ChunkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks that `record` could be put at `row` without mutating the registry.
    pub fn check_insertable(&self, row: usize, chunk_id: &str) -> Result<(), RagError> {
        if self.by_row.contains_key(&row) {
            return Err(RagError::DuplicateRow { row });
        }
        if let Some(&existing) = self.row_by_chunk_id.get(chunk_id) {
            return Err(RagError::DuplicateChunkId {
                chunk_id: chunk_id.to_string(),
                row: existing,
            });
        }
        Ok(())
    }

    pub fn put(&mut self, row: usize, record: ChunkRecord) -> Result<(), RagError> {
        self.check_insertable(row, &record.chunk_id)?;
        self.row_by_chunk_id.insert(record.chunk_id.clone(), row);
        self.by_row.insert(row, record);
        Ok(())
    }

    pub fn get(&self, row: usize) -> Result<&ChunkRecord, RagError> {
        self.by_row.get(&row).ok_or(RagError::UnknownRow { row })
    }

    pub fn count(&self) -> usize {
        self.by_row.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_row.is_empty()
    }

    /// Entries in ascending row order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &ChunkRecord)> {
        self.by_row.iter().map(|(row, record)| (*row, record))
    }

    /// True when rows are exactly `0..count`.
    pub fn is_dense(&self) -> bool {
        self.by_row.keys().enumerate().all(|(i, row)| i == *row)
    }

    #[cfg(test)]
    pub(crate) fn remove(&mut self, row: usize) -> Option<ChunkRecord> {
        let record = self.by_row.remove(&row)?;
        self.row_by_chunk_id.remove(&record.chunk_id);
        Some(record)
    }
}
