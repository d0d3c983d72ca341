//! Sliding-window chunker
//!
//! Slices a per-unit-time embedding sequence into fixed-length windows at
//! starts `0, H, 2H, …` and reduces each window to its mean vector.
//!
//! A trailing window shorter than the chunk length is dropped when at least
//! one full window exists; a track shorter than one chunk yields a single
//! partial chunk so it is still searchable.

use crate::config::ChunkingConfig;
use crate::types::{Chunk, EmbeddingVector, TimeRange};
use tunecheck_common::vector;

/// Chunker with fixed length, hop and normalization
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_len: usize,
    hop: usize,
    normalize: bool,
}

impl Chunker {
    pub fn new(config: &ChunkingConfig) -> Self {
        Self {
            chunk_len: config.chunk_len.max(1),
            hop: config.hop.max(1),
            normalize: config.normalize,
        }
    }

    /// Window ranges for a sequence of `total` units
    pub fn windows(&self, total: usize) -> Vec<TimeRange> {
        let mut ranges = Vec::new();
        let mut start = 0;
        while start < total {
            let end = start + self.chunk_len;
            if end > total {
                if ranges.is_empty() {
                    ranges.push(TimeRange { start, end: total });
                }
                break;
            }
            ranges.push(TimeRange { start, end });
            start += self.hop;
        }
        ranges
    }

    /// Chunk one track's embedding sequence
    ///
    /// Deterministic: identical input always yields identical chunks.
    pub fn chunk(&self, track_id: &str, frames: &[EmbeddingVector]) -> Vec<Chunk> {
        self.windows(frames.len())
            .into_iter()
            .filter_map(|range| {
                let mut mean = vector::mean(&frames[range.start..range.end])?;
                if self.normalize {
                    vector::l2_normalize(&mut mean);
                }
                Some(Chunk {
                    track_id: track_id.to_string(),
                    range,
                    vector: mean,
                })
            })
            .collect()
    }
}
