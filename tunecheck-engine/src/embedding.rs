//! Embedding and feature provider contracts, plus the built-in baselines
//!
//! The pipeline only depends on the three traits. The baselines make the
//! binary usable without external models:
//!
//! - [`LogMelEmbedder`]: one 64-band log-mel vector per second of audio
//! - [`HashingTextEmbedder`]: signed feature hashing of word unigrams and bigrams
//! - [`ChromaExtractor`]: 12-bin pitch-class frames for melody alignment
//!
//! All providers are synchronous and CPU-bound; callers run them on rayon or
//! `spawn_blocking` threads.

use crate::audio::{self, ChromaFrame, ChromaMap, MelFilterbank, Stft};
use crate::config::VerificationConfig;
use crate::error::{DetectError, DetectResult};
use crate::types::EmbeddingVector;
use std::path::Path;
use tunecheck_common::vector;

/// Audio to per-unit-time vectors
pub trait AudioEmbedder: Send + Sync {
    /// Identifier recorded in the index manifest
    fn name(&self) -> &str;

    fn dimension(&self) -> usize;

    /// One vector per unit of time (one second for the baseline)
    ///
    /// # Errors
    /// `EmbeddingExtraction` when the file cannot be decoded or yields no frames
    fn embed(&self, path: &Path) -> DetectResult<Vec<EmbeddingVector>>;
}

/// Text to a single vector
pub trait TextEmbedder: Send + Sync {
    fn dimension(&self) -> usize;

    fn embed(&self, text: &str) -> DetectResult<EmbeddingVector>;
}

/// Pitch-class feature sequences for melody verification
pub trait FeatureExtractor: Send + Sync {
    /// Chroma frames for at most the first `max_seconds` of the file
    fn chroma(&self, path: &Path, max_seconds: f32) -> DetectResult<Vec<ChromaFrame>>;
}

fn extraction_error(path: &Path, error: impl std::fmt::Display) -> DetectError {
    DetectError::EmbeddingExtraction {
        path: path.to_path_buf(),
        reason: error.to_string(),
    }
}

/// Baseline audio embedder: per-second mean of log-mel frames
pub struct LogMelEmbedder {
    sample_rate: u32,
    stft: Stft,
    filterbank: MelFilterbank,
}

impl LogMelEmbedder {
    pub const SAMPLE_RATE: u32 = 22050;
    pub const FFT_SIZE: usize = 2048;
    pub const HOP: usize = 512;
    pub const BANDS: usize = 64;

    pub fn new() -> Self {
        Self {
            sample_rate: Self::SAMPLE_RATE,
            stft: Stft::new(Self::FFT_SIZE, Self::HOP),
            filterbank: MelFilterbank::new(Self::SAMPLE_RATE, Self::FFT_SIZE, Self::BANDS, 50.0, 8000.0),
        }
    }
}

impl Default for LogMelEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEmbedder for LogMelEmbedder {
    fn name(&self) -> &str {
        "log-mel-64"
    }

    fn dimension(&self) -> usize {
        Self::BANDS
    }

    fn embed(&self, path: &Path) -> DetectResult<Vec<EmbeddingVector>> {
        let decoded = audio::decode_mono(path, self.sample_rate, None)
            .map_err(|e| extraction_error(path, format!("{:#}", e)))?;
        let vectors = audio::log_mel_per_second(&decoded.samples, self.sample_rate, &self.stft, &self.filterbank);
        if vectors.is_empty() {
            return Err(extraction_error(path, "no audio frames"));
        }
        tracing::debug!(
            path = %path.display(),
            seconds = vectors.len(),
            "Audio embedded"
        );
        Ok(vectors)
    }
}

/// Baseline chroma extractor driven by the verification settings
pub struct ChromaExtractor {
    sample_rate: u32,
    stft: Stft,
    map: ChromaMap,
}

impl ChromaExtractor {
    pub const FMIN: f32 = 55.0;
    pub const FMAX: f32 = 5000.0;

    pub fn new(config: &VerificationConfig) -> Self {
        Self {
            sample_rate: config.sample_rate,
            stft: Stft::new(config.fft_size, config.frame_hop),
            map: ChromaMap::new(config.sample_rate, config.fft_size, Self::FMIN, Self::FMAX),
        }
    }
}

impl FeatureExtractor for ChromaExtractor {
    fn chroma(&self, path: &Path, max_seconds: f32) -> DetectResult<Vec<ChromaFrame>> {
        let decoded = audio::decode_mono(path, self.sample_rate, Some(max_seconds))
            .map_err(|e| extraction_error(path, format!("{:#}", e)))?;
        let frames = audio::chroma_frames(&decoded.samples, &self.stft, &self.map);
        if frames.is_empty() {
            return Err(extraction_error(path, "no chroma frames"));
        }
        Ok(frames)
    }
}

/// Baseline text embedder using signed feature hashing
#[derive(Debug, Clone)]
pub struct HashingTextEmbedder {
    dimension: usize,
}

impl HashingTextEmbedder {
    pub const DEFAULT_DIMENSION: usize = 384;

    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn tokens(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric() && c != '\'')
            .map(|t| t.trim_matches('\'').to_lowercase())
            .filter(|t| !t.is_empty())
            .collect()
    }

    fn add_feature(&self, out: &mut [f32], feature: &str) {
        let hash = fnv1a(feature.as_bytes());
        let slot = (hash % self.dimension as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        out[slot] += sign;
    }
}

impl Default for HashingTextEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSION)
    }
}

impl TextEmbedder for HashingTextEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    /// Empty text embeds to the zero vector, which matches nothing
    fn embed(&self, text: &str) -> DetectResult<EmbeddingVector> {
        let tokens = Self::tokens(text);
        let mut out = vec![0.0f32; self.dimension];
        for token in &tokens {
            self.add_feature(&mut out, token);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut out, &format!("{} {}", pair[0], pair[1]));
        }
        vector::l2_normalize(&mut out);
        Ok(out)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, &b| (hash ^ b as u64).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_embedding_is_unit_and_deterministic() {
        let embedder = HashingTextEmbedder::default();
        let a = embedder.embed("Hello darkness my old friend").unwrap();
        let b = embedder.embed("Hello darkness my old friend").unwrap();
        assert_eq!(a.len(), 384);
        assert_eq!(a, b);
        assert!((vector::l2_norm(&a) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_text_similarity_orders_sensibly() {
        let embedder = HashingTextEmbedder::default();
        let base = embedder
            .embed("I walk the line because you're mine")
            .unwrap();
        let close = embedder
            .embed("I walk the line, because you're mine!")
            .unwrap();
        let far = embedder
            .embed("Purple rain falling on the quiet harbour tonight")
            .unwrap();
        let close_sim = vector::dot(&base, &close);
        let far_sim = vector::dot(&base, &far);
        assert!((close_sim - 1.0).abs() < 1e-5);
        assert!(far_sim < 0.5, "far similarity {}", far_sim);
    }

    #[test]
    fn test_empty_text_is_zero_vector() {
        let embedder = HashingTextEmbedder::new(16);
        let v = embedder.embed("  ... ").unwrap();
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_fnv1a_known_value() {
        assert_eq!(fnv1a(b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xaf63_dc4c_8601_ec8c);
    }

    #[test]
    fn test_missing_audio_is_extraction_error() {
        let embedder = LogMelEmbedder::new();
        let err = embedder.embed(Path::new("/nonexistent/song.mp3")).unwrap_err();
        assert!(matches!(err, DetectError::EmbeddingExtraction { .. }));
        assert!(err.is_recoverable());
    }
}
