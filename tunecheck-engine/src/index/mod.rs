//! Reference index primitives
//!
//! The pipeline only needs `add` and `search(query, k)` from a nearest-neighbour
//! index. [`FlatIndex`] is the exact inner-product implementation used by
//! default; approximate structures can be swapped in behind [`VectorIndex`].

pub mod snapshot;

pub use snapshot::{IndexManifest, IndexSnapshot, LyricsCorpus, SnapshotStore};

use crate::error::{DetectError, DetectResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One ranked search result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchHit {
    /// Entry id as passed to `add`
    pub id: usize,
    /// Inner product with the query
    pub score: f32,
}

/// Nearest-neighbour index contract
pub trait VectorIndex: Send + Sync {
    /// Vector dimension accepted by `add` and `search`
    fn dimension(&self) -> usize;

    /// Number of stored entries
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Store `vector` under `id`
    fn add(&mut self, vector: &[f32], id: usize) -> DetectResult<()>;

    /// Top `k` entries by inner product, descending
    fn search(&self, query: &[f32], k: usize) -> DetectResult<Vec<SearchHit>>;
}

/// Exact inner-product index over a flat row-major buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatIndex {
    dimension: usize,
    ids: Vec<usize>,
    data: Vec<f32>,
}

impl FlatIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            ids: Vec::new(),
            data: Vec::new(),
        }
    }

    /// Build from vectors whose ids are their positions
    pub fn from_vectors<V: AsRef<[f32]>>(dimension: usize, vectors: &[V]) -> DetectResult<Self> {
        let mut index = Self::new(dimension);
        for (id, v) in vectors.iter().enumerate() {
            index.add(v.as_ref(), id)?;
        }
        Ok(index)
    }

    /// Stored vector at a row position
    pub fn row(&self, position: usize) -> Option<&[f32]> {
        let start = position.checked_mul(self.dimension)?;
        self.data.get(start..start + self.dimension)
    }

    /// Iterate over all stored vectors in insertion order
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimension.max(1))
    }

    /// Buffer consistency check after deserialization
    pub fn is_consistent(&self) -> bool {
        self.dimension > 0 && self.data.len() == self.ids.len() * self.dimension
    }

    fn check_dimension(&self, len: usize, what: &str) -> DetectResult<()> {
        if len != self.dimension {
            return Err(DetectError::IndexCorpusMismatch(format!(
                "{} has dimension {} but the index stores {}",
                what, len, self.dimension
            )));
        }
        Ok(())
    }
}

impl VectorIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn add(&mut self, vector: &[f32], id: usize) -> DetectResult<()> {
        self.check_dimension(vector.len(), "added vector")?;
        self.ids.push(id);
        self.data.extend_from_slice(vector);
        Ok(())
    }

    fn search(&self, query: &[f32], k: usize) -> DetectResult<Vec<SearchHit>> {
        self.check_dimension(query.len(), "query vector")?;
        if k == 0 || self.ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = self
            .rows()
            .zip(self.ids.iter())
            .map(|(row, &id)| SearchHit {
                id,
                score: tunecheck_common::vector::dot(row, query),
            })
            .collect();

        // Descending score; equal scores fall back to ascending id so results are stable
        let order = |a: &SearchHit, b: &SearchHit| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then(a.id.cmp(&b.id))
        };

        if k < hits.len() {
            hits.select_nth_unstable_by(k - 1, order);
            hits.truncate(k);
        }
        hits.sort_by(order);
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(v: &[f32]) -> Vec<f32> {
        let mut v = v.to_vec();
        tunecheck_common::vector::l2_normalize(&mut v);
        v
    }

    fn sample_index() -> FlatIndex {
        FlatIndex::from_vectors(
            2,
            &[unit(&[1.0, 0.0]), unit(&[0.0, 1.0]), unit(&[1.0, 1.0]), unit(&[1.0, 0.2])],
        )
        .unwrap()
    }

    #[test]
    fn test_search_orders_by_inner_product() {
        let index = sample_index();
        let hits = index.search(&unit(&[1.0, 0.1]), 3).unwrap();
        let ids: Vec<usize> = hits.iter().map(|h| h.id).collect();
        assert_eq!(ids, vec![3, 0, 2]);
        assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_search_k_larger_than_index() {
        let index = sample_index();
        assert_eq!(index.search(&unit(&[0.0, 1.0]), 10).unwrap().len(), 4);
        assert!(index.search(&unit(&[0.0, 1.0]), 0).unwrap().is_empty());
    }

    #[test]
    fn test_ties_break_by_id() {
        let index = FlatIndex::from_vectors(2, &[vec![1.0, 0.0], vec![1.0, 0.0], vec![1.0, 0.0]])
            .unwrap();
        let hits = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(hits.iter().map(|h| h.id).collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_dimension_mismatch_is_reported() {
        let mut index = sample_index();
        assert!(matches!(
            index.search(&[1.0, 0.0, 0.0], 1),
            Err(DetectError::IndexCorpusMismatch(_))
        ));
        assert!(index.add(&[1.0], 9).is_err());
    }

    #[test]
    fn test_repeated_search_is_identical() {
        let index = sample_index();
        let q = unit(&[0.3, 0.7]);
        assert_eq!(index.search(&q, 4).unwrap(), index.search(&q, 4).unwrap());
    }

    #[test]
    fn test_rows_round_trip() {
        let index = sample_index();
        assert_eq!(index.rows().count(), 4);
        assert_eq!(index.row(1), Some(&unit(&[0.0, 1.0])[..]));
        assert!(index.row(4).is_none());
        assert!(index.is_consistent());
    }
}
