//! Dynamic time warping over feature frame sequences
//!
//! Frame distance is cosine distance. The cumulative cost is
//! `C[i][j] = D[i][j] + min(C[i-1][j], C[i][j-1], C[i-1][j-1])` with edges using
//! only their valid predecessors. Alongside each cell we keep the length (in
//! cells) of the optimal path reaching it; among equal-cost predecessors the
//! shorter path wins. Swapping the two sequences transposes both matrices, so
//! the total cost and path length are symmetric.
//!
//! Only two rows are kept, so memory is `O(m)` while time stays `O(n·m)`.

use crate::config::MelodyTransform;
use thiserror::Error;
use tunecheck_common::vector::cosine_distance;

/// Why an alignment produced no result
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AlignError {
    #[error("cannot align an empty frame sequence")]
    EmptySequence,
    #[error("alignment cancelled")]
    Cancelled,
}

/// Optimal alignment summary
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alignment {
    /// `C[n-1][m-1]`
    pub total_cost: f32,
    /// Cells on the optimal warping path
    pub path_len: usize,
    /// `total_cost / path_len`
    pub avg_cost: f32,
}

impl Alignment {
    pub fn melody_score(&self, transform: MelodyTransform) -> f32 {
        transform.apply(self.avg_cost)
    }
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    cost: f32,
    len: u32,
}

impl Cell {
    fn better(self, other: Cell) -> Cell {
        if other.cost < self.cost || (other.cost == self.cost && other.len < self.len) {
            other
        } else {
            self
        }
    }
}

/// Align two frame sequences
///
/// `should_stop` is polled once per query row so long alignments can be
/// abandoned when their time budget runs out.
pub fn align<Q, R, F>(query: &[Q], reference: &[R], should_stop: F) -> Result<Alignment, AlignError>
where
    Q: AsRef<[f32]>,
    R: AsRef<[f32]>,
    F: Fn() -> bool,
{
    let (n, m) = (query.len(), reference.len());
    if n == 0 || m == 0 {
        return Err(AlignError::EmptySequence);
    }

    let mut prev: Vec<Cell> = Vec::with_capacity(m);
    let mut curr: Vec<Cell> = Vec::with_capacity(m);

    for (i, q) in query.iter().enumerate() {
        if should_stop() {
            return Err(AlignError::Cancelled);
        }
        curr.clear();
        for (j, r) in reference.iter().enumerate() {
            let d = cosine_distance(q.as_ref(), r.as_ref());
            let best = match (i, j) {
                (0, 0) => Cell { cost: 0.0, len: 0 },
                (0, _) => curr[j - 1],
                (_, 0) => prev[0],
                _ => prev[j - 1].better(prev[j]).better(curr[j - 1]),
            };
            curr.push(Cell {
                cost: best.cost + d,
                len: best.len + 1,
            });
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    let last = prev[m - 1];
    let path_len = last.len as usize;
    Ok(Alignment {
        total_cost: last.cost,
        path_len,
        avg_cost: last.cost / path_len as f32,
    })
}

/// Melody score of two sequences under a transform
pub fn melody_score<Q, R, F>(
    query: &[Q],
    reference: &[R],
    transform: MelodyTransform,
    should_stop: F,
) -> Result<f32, AlignError>
where
    Q: AsRef<[f32]>,
    R: AsRef<[f32]>,
    F: Fn() -> bool,
{
    Ok(align(query, reference, should_stop)?.melody_score(transform))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell as StdCell;

    fn never() -> bool {
        false
    }

    fn onehot(class: usize) -> [f32; 12] {
        let mut frame = [0.0; 12];
        frame[class % 12] = 1.0;
        frame
    }

    fn melody(classes: &[usize]) -> Vec<[f32; 12]> {
        classes.iter().map(|&c| onehot(c)).collect()
    }

    /// Pseudo-random frames without an RNG dependency
    fn noise_frames(n: usize, seed: u32) -> Vec<Vec<f32>> {
        let mut state = seed.wrapping_mul(2_654_435_761).wrapping_add(1);
        (0..n)
            .map(|_| {
                (0..12)
                    .map(|_| {
                        state ^= state << 13;
                        state ^= state >> 17;
                        state ^= state << 5;
                        (state % 1000) as f32 / 1000.0
                    })
                    .collect()
            })
            .collect()
    }

    #[test]
    fn test_identical_sequences_cost_zero() {
        let a = melody(&[0, 4, 7, 0, 5, 9]);
        let alignment = align(&a, &a, never).unwrap();
        assert!(alignment.total_cost.abs() < 1e-6);
        assert_eq!(alignment.path_len, 6);
        assert_eq!(alignment.melody_score(MelodyTransform::Linear), 1.0);
    }

    #[test]
    fn test_time_stretched_copy_aligns_cheaply() {
        let a = melody(&[0, 4, 7, 11]);
        let stretched = melody(&[0, 0, 4, 4, 7, 7, 11, 11]);
        let alignment = align(&a, &stretched, never).unwrap();
        assert!(alignment.total_cost.abs() < 1e-6);
        assert_eq!(alignment.path_len, 8);
    }

    #[test]
    fn test_disjoint_sequences_cost_one_per_cell() {
        let a = melody(&[0, 0, 0]);
        let b = melody(&[6, 6, 6]);
        let alignment = align(&a, &b, never).unwrap();
        assert!((alignment.avg_cost - 1.0).abs() < 1e-6);
        assert_eq!(alignment.melody_score(MelodyTransform::Linear), 0.0);
        assert!((alignment.melody_score(MelodyTransform::Reciprocal) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_cost_matches_hand_computed_matrix() {
        // D = [[0, 1], [1, 0], [1, 0]] for query (A, B, B) vs reference (A, B)
        let q = melody(&[0, 1, 1]);
        let r = melody(&[0, 1]);
        let alignment = align(&q, &r, never).unwrap();
        assert!(alignment.total_cost.abs() < 1e-6);
        assert_eq!(alignment.path_len, 3);
    }

    #[test]
    fn test_symmetry_under_swap() {
        for seed in 1..20 {
            let a = noise_frames(17 + seed as usize, seed);
            let b = noise_frames(11 + (seed as usize * 3) % 13, seed + 100);
            let ab = align(&a, &b, never).unwrap();
            let ba = align(&b, &a, never).unwrap();
            assert!((ab.total_cost - ba.total_cost).abs() < 1e-4);
            assert_eq!(ab.path_len, ba.path_len);
            let sab = ab.melody_score(MelodyTransform::Linear);
            let sba = ba.melody_score(MelodyTransform::Linear);
            assert!((sab - sba).abs() < 1e-5);
        }
    }

    #[test]
    fn test_symmetry_with_ties() {
        let a = melody(&[0, 0, 3, 3, 3, 7]);
        let b = melody(&[0, 3, 3, 7, 7]);
        let ab = align(&a, &b, never).unwrap();
        let ba = align(&b, &a, never).unwrap();
        assert_eq!(ab, ba);
    }

    #[test]
    fn test_path_len_bounds() {
        let a = noise_frames(9, 7);
        let b = noise_frames(4, 8);
        let alignment = align(&a, &b, never).unwrap();
        assert!(alignment.path_len >= 9);
        assert!(alignment.path_len <= 9 + 4 - 1);
    }

    #[test]
    fn test_empty_sequence_rejected() {
        let empty: Vec<[f32; 12]> = Vec::new();
        assert_eq!(align(&empty, &melody(&[1]), never), Err(AlignError::EmptySequence));
    }

    #[test]
    fn test_cancellation_is_polled() {
        let polls = StdCell::new(0);
        let result = align(&noise_frames(50, 1), &noise_frames(50, 2), || {
            polls.set(polls.get() + 1);
            polls.get() > 3
        });
        assert_eq!(result, Err(AlignError::Cancelled));
        assert_eq!(polls.get(), 4);
    }

    #[test]
    fn test_scores_bounded() {
        let score = melody_score(&noise_frames(30, 3), &noise_frames(25, 4), MelodyTransform::Linear, never)
            .unwrap();
        assert!((0.0..=1.0).contains(&score));
    }
}
