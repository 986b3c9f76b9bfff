//! Flat, exact inner-product vector index.
//!
//! Vectors are kept as one contiguous row-major `f32` matrix. Search scores
//! every row against the query (no approximation) and ranks by descending
//! score, breaking ties by ascending row index.
//!
//! On-disk layout (little endian):
//!
//! ```text
//! magic  b"DRAGVEC1"      8 bytes
//! dim    u32              4 bytes
//! rows   u64              8 bytes
//! data   f32 x rows*dim   row-major
//! ```

use std::cmp::Ordering;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::Path;

use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::core::errors::RagError;

const MAGIC: &[u8; 8] = b"DRAGVEC1";
const HEADER_LEN: usize = 8 + 4 + 8;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub row: usize,
    pub score: f32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VectorStore {
    dimension: Option<usize>,
    data: Vec<f32>,
    rows: usize,
}

impl VectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose dimension is fixed before the first insert.
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension: Some(dimension),
            ..Self::default()
        }
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn size(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Checks that a vector of `len` could be added without mutating the store.
    pub fn check_dimension(&self, len: usize) -> Result<(), RagError> {
        match self.dimension {
            Some(expected) if expected != len => Err(RagError::DimensionMismatch {
                expected,
                actual: len,
            }),
            None if len == 0 => Err(RagError::DimensionMismatch {
                expected: 1,
                actual: 0,
            }),
            _ => Ok(()),
        }
    }

    /// Appends a vector and returns its row index. The first add fixes the dimension.
    pub fn add(&mut self, vector: &[f32]) -> Result<usize, RagError> {
        self.check_dimension(vector.len())?;
        self.dimension.get_or_insert(vector.len());

        let row = self.rows;
        self.data.extend_from_slice(vector);
        self.rows += 1;
        Ok(row)
    }

    pub fn row(&self, row: usize) -> Option<&[f32]> {
        let dim = self.dimension?;
        (row < self.rows).then(|| &self.data[row * dim..(row + 1) * dim])
    }

    /// Exact top-k by inner product. `top_k` is clamped to the row count and an
    /// empty store yields no hits.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<SearchHit>, RagError> {
        let Some(dim) = self.dimension else {
            return Ok(Vec::new());
        };
        if self.rows == 0 || top_k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != dim {
            return Err(RagError::DimensionMismatch {
                expected: dim,
                actual: query.len(),
            });
        }

        let matrix = ArrayView2::from_shape((self.rows, dim), &self.data)
            .map_err(|err| RagError::CorruptIndex(err.to_string()))?;
        let scores = matrix.dot(&ArrayView1::from(query));

        let mut hits: Vec<SearchHit> = scores
            .iter()
            .enumerate()
            .map(|(row, &score)| SearchHit { row, score })
            .collect();

        let k = top_k.min(hits.len());
        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, rank_order);
            hits.truncate(k);
        }
        hits.sort_by(rank_order);

        Ok(hits)
    }

    /// Writes the matrix to `path` via a temp file and rename.
    pub fn save(&self, path: &Path) -> Result<(), RagError> {
        let tmp_path = path.with_extension("bin.tmp");
        {
            let file = fs::File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(MAGIC)?;
            writer.write_all(&(self.dimension.unwrap_or(0) as u32).to_le_bytes())?;
            writer.write_all(&(self.rows as u64).to_le_bytes())?;
            for value in &self.data {
                writer.write_all(&value.to_le_bytes())?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, RagError> {
        let bytes = fs::read(path)?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RagError> {
        if bytes.len() < HEADER_LEN {
            return Err(RagError::CorruptIndex(format!(
                "vector file too short for header: {} bytes",
                bytes.len()
            )));
        }
        if &bytes[..8] != MAGIC {
            return Err(RagError::CorruptIndex(
                "vector file has an unknown magic header".to_string(),
            ));
        }

        let dim = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let mut rows_bytes = [0u8; 8];
        rows_bytes.copy_from_slice(&bytes[12..20]);
        let rows = u64::from_le_bytes(rows_bytes) as usize;

        if dim == 0 && rows > 0 {
            return Err(RagError::CorruptIndex(format!(
                "declared dimension 0 with {} rows",
                rows
            )));
        }

        let payload = &bytes[HEADER_LEN..];
        let expected_len = rows
            .checked_mul(dim)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| RagError::CorruptIndex("declared matrix size overflows".to_string()))?;
        if payload.len() != expected_len {
            return Err(RagError::CorruptIndex(format!(
                "declared {} rows x {} dims needs {} bytes, found {}",
                rows,
                dim,
                expected_len,
                payload.len()
            )));
        }

        let data = payload
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        Ok(Self {
            dimension: (dim > 0).then_some(dim),
            data,
            rows,
        })
    }
}

/// Descending score, then ascending row.
fn rank_order(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.row.cmp(&b.row))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(left: f32, right: f32) -> bool {
        (left - right).abs() < 1e-6
    }

    fn unit(v: &[f32]) -> Vec<f32> {
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        v.iter().map(|x| x / norm).collect()
    }

    fn sample_store() -> VectorStore {
        let mut store = VectorStore::new();
        for v in [
            [0.9, 0.1, 0.0],
            [0.1, 0.9, 0.0],
            [0.0, 0.1, 0.9],
            [0.7, 0.7, 0.0],
            [0.5, 0.5, 0.5],
        ] {
            store.add(&unit(&v)).unwrap();
        }
        store
    }

    #[test]
    fn orthogonal_unit_vectors_rank_exactly() {
        let mut store = VectorStore::new();
        assert_eq!(store.add(&[1.0, 0.0]).unwrap(), 0);
        assert_eq!(store.add(&[0.0, 1.0]).unwrap(), 1);

        let hits = store.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(
            hits,
            vec![
                SearchHit { row: 0, score: 1.0 },
                SearchHit { row: 1, score: 0.0 },
            ]
        );
    }

    #[test]
    fn empty_store_returns_no_hits() {
        let store = VectorStore::new();
        assert_eq!(store.size(), 0);
        assert!(store.search(&[1.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn top_k_is_clamped_to_row_count() {
        let store = sample_store();
        assert_eq!(store.search(&unit(&[1.0, 0.0, 0.0]), 50).unwrap().len(), 5);
        assert!(store.search(&unit(&[1.0, 0.0, 0.0]), 0).unwrap().is_empty());
    }

    #[test]
    fn ties_break_by_ascending_row() {
        let mut store = VectorStore::new();
        store.add(&[0.0, 1.0]).unwrap();
        store.add(&[1.0, 0.0]).unwrap();
        store.add(&[0.0, 1.0]).unwrap();
        store.add(&[1.0, 0.0]).unwrap();

        let hits = store.search(&[1.0, 0.0], 3).unwrap();
        let rows: Vec<usize> = hits.iter().map(|h| h.row).collect();
        assert_eq!(rows, vec![1, 3, 0]);
    }

    #[test]
    fn results_are_sorted_and_stable_across_calls() {
        let store = sample_store();
        let query = unit(&[1.0, 0.2, 0.1]);
        let first = store.search(&query, 3).unwrap();
        for _ in 0..5 {
            assert_eq!(store.search(&query, 3).unwrap(), first);
        }
        assert_eq!(first[0].row, 0);
        assert!(first.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn partial_top_k_matches_full_ranking_prefix() {
        let store = sample_store();
        let query = unit(&[0.3, 0.3, 0.9]);
        let full = store.search(&query, 5).unwrap();
        for k in 1..=5 {
            assert_eq!(store.search(&query, k).unwrap(), full[..k].to_vec());
        }
    }

    #[test]
    fn first_add_fixes_dimension() {
        let mut store = VectorStore::new();
        store.add(&[1.0, 0.0, 0.0]).unwrap();
        let err = store.add(&[1.0, 0.0]).unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert_eq!(store.size(), 1);
    }

    #[test]
    fn preset_dimension_rejects_mismatch() {
        let mut store = VectorStore::with_dimension(4);
        assert!(store.add(&[1.0, 0.0]).is_err());
        assert!(store.add(&[]).is_err());
        assert_eq!(store.add(&[0.0, 0.0, 0.0, 1.0]).unwrap(), 0);
    }

    #[test]
    fn query_dimension_mismatch_is_an_error() {
        let store = sample_store();
        assert!(matches!(
            store.search(&[1.0, 0.0], 1),
            Err(RagError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn ranking_is_independent_of_insert_batching() {
        let vectors: Vec<Vec<f32>> = (0..12)
            .map(|i| unit(&[(i as f32).sin(), (i as f32).cos(), 0.25]))
            .collect();

        let mut one_by_one = VectorStore::new();
        for v in &vectors {
            one_by_one.add(v).unwrap();
        }

        let mut grouped = VectorStore::new();
        for group in vectors.chunks(5) {
            for v in group {
                grouped.add(v).unwrap();
            }
        }

        let query = unit(&[0.4, 0.6, 0.2]);
        assert_eq!(
            one_by_one.search(&query, 7).unwrap(),
            grouped.search(&query, 7).unwrap()
        );
    }

    #[test]
    fn save_and_load_round_trip_is_bit_exact() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vectors.bin");
        let mut store = sample_store();
        store.add(&unit(&[1e-7, 3.3, -2.2])).unwrap();

        store.save(&path).unwrap();
        let loaded = VectorStore::load(&path).unwrap();

        assert_eq!(loaded, store);
        assert_eq!(loaded.dimension(), Some(3));
        for row in 0..store.size() {
            let a: Vec<u32> = store.row(row).unwrap().iter().map(|v| v.to_bits()).collect();
            let b: Vec<u32> = loaded.row(row).unwrap().iter().map(|v| v.to_bits()).collect();
            assert_eq!(a, b);
        }

        let query = unit(&[0.2, 0.9, 0.1]);
        assert_eq!(
            loaded.search(&query, 4).unwrap(),
            store.search(&query, 4).unwrap()
        );
        assert!(!tmp.path().join("vectors.bin.tmp").exists());
    }

    #[test]
    fn empty_store_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vectors.bin");
        VectorStore::new().save(&path).unwrap();

        let loaded = VectorStore::load(&path).unwrap();
        assert_eq!(loaded.size(), 0);
        assert_eq!(loaded.dimension(), None);
    }

    #[test]
    fn truncated_payload_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("vectors.bin");
        sample_store().save(&path).unwrap();

        let mut bytes = fs::read(&path).unwrap();
        bytes.truncate(bytes.len() - 4);
        let err = VectorStore::from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, RagError::CorruptIndex(_)));
        assert!(err.to_string().contains("5 rows x 3 dims"));
    }

    #[test]
    fn dimension_disagreeing_with_rows_is_corrupt() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(&2u64.to_le_bytes());
        for v in [1.0f32, 0.0, 0.0, 0.0, 1.0, 0.0] {
            bytes.extend_from_slice(&v.to_le_bytes());
        }
        assert!(matches!(
            VectorStore::from_bytes(&bytes),
            Err(RagError::CorruptIndex(_))
        ));
    }

    #[test]
    fn bad_magic_and_short_header_are_corrupt() {
        assert!(VectorStore::from_bytes(b"short").is_err());
        let mut bytes = vec![0u8; HEADER_LEN];
        bytes[..8].copy_from_slice(b"NOTMAGIC");
        assert!(matches!(
            VectorStore::from_bytes(&bytes),
            Err(RagError::CorruptIndex(_))
        ));
    }

    #[test]
    fn scores_are_cosine_for_unit_inputs() {
        let store = sample_store();
        let query = unit(&[0.7, 0.7, 0.0]);
        let hits = store.search(&query, 1).unwrap();
        assert_eq!(hits[0].row, 3);
        assert!(approx_eq(hits[0].score, 1.0));
    }
}
