//! Deterministic providers for pipeline tests
//!
//! A fake "audio" file is plain text: one line per second, each line a
//! comma-separated vector. The audio embedder returns the lines as they are;
//! the feature extractor folds the first 12 values of each line into a chroma
//! frame. Tests can therefore design exact similarities without decoding.

use std::path::{Path, PathBuf};
use tunecheck_engine::audio::ChromaFrame;
use tunecheck_engine::embedding::{AudioEmbedder, FeatureExtractor};
use tunecheck_engine::error::{DetectError, DetectResult};
use tunecheck_engine::types::EmbeddingVector;

pub const DIMENSION: usize = 12;

fn parse(path: &Path) -> DetectResult<Vec<Vec<f32>>> {
    let text = std::fs::read_to_string(path).map_err(|e| DetectError::EmbeddingExtraction {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .map(|line| {
            line.split(',')
                .map(|v| v.trim().parse::<f32>())
                .collect::<Result<Vec<f32>, _>>()
                .map_err(|e| DetectError::EmbeddingExtraction {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
        })
        .collect()
}

pub struct TextVectorEmbedder;

impl AudioEmbedder for TextVectorEmbedder {
    fn name(&self) -> &str {
        "text-vectors"
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn embed(&self, path: &Path) -> DetectResult<Vec<EmbeddingVector>> {
        let rows = parse(path)?;
        if rows.is_empty() {
            return Err(DetectError::EmbeddingExtraction {
                path: path.to_path_buf(),
                reason: "empty".into(),
            });
        }
        Ok(rows)
    }
}

pub struct TextChromaExtractor;

impl FeatureExtractor for TextChromaExtractor {
    fn chroma(&self, path: &Path, max_seconds: f32) -> DetectResult<Vec<ChromaFrame>> {
        let rows = parse(path)?;
        Ok(rows
            .iter()
            .take(max_seconds.max(0.0) as usize)
            .map(|row| {
                let mut frame = [0.0f32; 12];
                for (slot, v) in frame.iter_mut().zip(row.iter()) {
                    *slot = *v;
                }
                frame
            })
            .collect())
    }
}

/// Per-second vectors for a synthetic track occupying bins `4k..4k+4`
///
/// Each second emphasises one bin of the track's band in a period-4 cycle,
/// so chunks of one track are close to each other and orthogonal to every
/// other track's chunks.
pub fn track_vectors(track: usize, seconds: usize) -> Vec<Vec<f32>> {
    let base = (track % 3) * 4;
    (0..seconds)
        .map(|i| {
            let mut v = vec![0.0f32; DIMENSION];
            v[base + i % 4] = 1.0;
            v[base + (i + 1) % 4] = 0.3;
            v
        })
        .collect()
}

/// Write vectors in the fake audio format
pub fn write_vectors(path: &Path, vectors: &[Vec<f32>]) -> PathBuf {
    let body: Vec<String> = vectors
        .iter()
        .map(|v| v.iter().map(|x| x.to_string()).collect::<Vec<_>>().join(","))
        .collect();
    std::fs::write(path, body.join("\n")).expect("write fake audio");
    path.to_path_buf()
}
