//! Detector configuration
//!
//! Every tuning constant of the pipeline is a named, defaulted field here.
//! The values are calibration starting points, not fixed behaviour.
//!
//! Loaded from the same TOML file as the bootstrap settings; any missing
//! section or key falls back to its built-in default.

use crate::error::{DetectError, DetectResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tunecheck_common::config::{load_toml_file, LoggingConfig};

/// Complete detector configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub chunking: ChunkingConfig,
    pub retrieval: RetrievalConfig,
    pub verification: VerificationConfig,
    pub fusion: FusionConfig,
    pub decision: DecisionConfig,
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
}

/// Sliding-window chunking over per-second embeddings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window length in embedding units (seconds for the audio embedder)
    pub chunk_len: usize,
    /// Step between window starts; `hop < chunk_len` gives overlap
    pub hop: usize,
    /// L2-normalize each chunk mean so inner product is cosine similarity
    pub normalize: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_len: 10,
            hop: 5,
            normalize: true,
        }
    }
}

/// Candidate retrieval and vote aggregation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Minimum hit similarity τ for a chunk to vote
    pub similarity_threshold: f32,
    /// Neighbours looked up per query chunk (1 = greedy top-1 voting)
    pub neighbors_per_chunk: usize,
    /// α in `rank = α·coverage + (1−α)·meanSimilarity`
    pub coverage_weight: f32,
    /// Number of ranked candidates sent to melody verification
    pub shortlist_size: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.65,
            neighbors_per_chunk: 1,
            coverage_weight: 0.7,
            shortlist_size: 3,
        }
    }
}

/// Monotone transform from average DTW cost to a [0,1] melody score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MelodyTransform {
    /// `clip(1 − avgCost, 0, 1)`
    Linear,
    /// `1 / (1 + avgCost)`
    Reciprocal,
}

impl MelodyTransform {
    pub fn apply(self, avg_cost: f32) -> f32 {
        match self {
            MelodyTransform::Linear => (1.0 - avg_cost).clamp(0.0, 1.0),
            MelodyTransform::Reciprocal => (1.0 / (1.0 + avg_cost.max(0.0))).clamp(0.0, 1.0),
        }
    }
}

/// Melody verification (chroma extraction + DTW)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Only the first N seconds of each file are aligned
    pub max_duration_secs: f32,
    /// Analysis sample rate
    pub sample_rate: u32,
    /// STFT hop between chroma frames (samples)
    pub frame_hop: usize,
    /// STFT window size (samples)
    pub fft_size: usize,
    /// Alignment jobs in flight per request
    pub max_concurrent: usize,
    /// Budget for one candidate's extraction + alignment
    pub candidate_timeout_ms: u64,
    /// Budget for the whole verification stage of one request
    pub request_timeout_ms: u64,
    pub melody_transform: MelodyTransform,
    /// Minimum normalized Levenshtein similarity for approximate file resolution
    pub resolve_cutoff: f64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: 30.0,
            sample_rate: 22050,
            frame_hop: 512,
            fft_size: 4096,
            max_concurrent: 4,
            candidate_timeout_ms: 20_000,
            request_timeout_ms: 60_000,
            melody_transform: MelodyTransform::Linear,
            resolve_cutoff: 0.5,
        }
    }
}

/// Channel fusion and anomaly scoring
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// β in `audioFused = β·meanSimilarity + (1−β)·melodyScore`
    pub similarity_weight: f32,
    /// γ in `hybrid = γ·audioFused + (1−γ)·lyricsScore`
    pub audio_weight: f32,
    /// ε added to the corpus standard deviation
    pub z_epsilon: f64,
    /// Lyric matches retrieved per query
    pub lyrics_top_k: usize,
    /// Entries reported in `top5_results`
    pub result_limit: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            similarity_weight: 0.7,
            audio_weight: 0.6,
            z_epsilon: 1e-12,
            lyrics_top_k: 5,
            result_limit: 5,
        }
    }
}

/// Verdict tier thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub critical: f32,
    pub high: f32,
    pub moderate: f32,
    /// z above this is critical regardless of the hybrid score
    pub z_threshold: f64,
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            critical: 0.90,
            high: 0.80,
            moderate: 0.70,
            z_threshold: 2.0,
        }
    }
}

/// Artifact and reference locations (relative paths resolve against the data folder)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Index snapshot directory
    pub index_dir: PathBuf,
    /// Reference audio directory
    pub songs_dir: PathBuf,
    /// Reference lyrics directory (`.txt` files)
    pub lyrics_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("index"),
            songs_dir: PathBuf::from("songs"),
            lyrics_dir: PathBuf::from("lyrics"),
        }
    }
}

impl PathsConfig {
    /// Make every relative path absolute under `data_folder`
    pub fn resolved_against(&self, data_folder: &Path) -> PathsConfig {
        let resolve = |p: &PathBuf| {
            if p.is_absolute() {
                p.clone()
            } else {
                data_folder.join(p)
            }
        };
        PathsConfig {
            index_dir: resolve(&self.index_dir),
            songs_dir: resolve(&self.songs_dir),
            lyrics_dir: resolve(&self.lyrics_dir),
        }
    }
}

fn check_unit(name: &str, value: f32) -> DetectResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(DetectError::InvalidConfig(format!(
            "{} must be within [0,1], got {}",
            name, value
        )))
    }
}

impl DetectorConfig {
    /// Load from a TOML file, falling back to defaults when the file is absent
    pub fn load(path: Option<&Path>) -> DetectResult<Self> {
        let config = match path {
            Some(path) => match load_toml_file::<DetectorConfig>(path)? {
                Some(config) => {
                    info!(path = %path.display(), "Detector configuration loaded");
                    config
                }
                None => {
                    warn!(path = %path.display(), "Config file missing, using built-in defaults");
                    DetectorConfig::default()
                }
            },
            None => DetectorConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that would break the scoring invariants
    pub fn validate(&self) -> DetectResult<()> {
        if self.chunking.chunk_len == 0 {
            return Err(DetectError::InvalidConfig("chunk_len must be positive".into()));
        }
        if self.chunking.hop == 0 || self.chunking.hop > self.chunking.chunk_len {
            return Err(DetectError::InvalidConfig(format!(
                "hop must be within 1..={}, got {}",
                self.chunking.chunk_len, self.chunking.hop
            )));
        }

        check_unit("similarity_threshold", self.retrieval.similarity_threshold.abs())?;
        check_unit("coverage_weight", self.retrieval.coverage_weight)?;
        check_unit("similarity_weight", self.fusion.similarity_weight)?;
        check_unit("audio_weight", self.fusion.audio_weight)?;

        if self.retrieval.neighbors_per_chunk == 0 {
            return Err(DetectError::InvalidConfig("neighbors_per_chunk must be positive".into()));
        }
        if self.retrieval.shortlist_size == 0 {
            return Err(DetectError::InvalidConfig("shortlist_size must be positive".into()));
        }
        if self.verification.max_concurrent == 0 {
            return Err(DetectError::InvalidConfig("max_concurrent must be positive".into()));
        }
        if self.verification.fft_size == 0 || self.verification.frame_hop == 0 {
            return Err(DetectError::InvalidConfig("fft_size and frame_hop must be positive".into()));
        }
        if !(0.0..=1.0).contains(&self.verification.resolve_cutoff) {
            return Err(DetectError::InvalidConfig(format!(
                "resolve_cutoff must be within [0,1], got {}",
                self.verification.resolve_cutoff
            )));
        }
        if self.fusion.z_epsilon < 0.0 {
            return Err(DetectError::InvalidConfig("z_epsilon must not be negative".into()));
        }

        let d = &self.decision;
        if !(d.critical >= d.high && d.high >= d.moderate) {
            return Err(DetectError::InvalidConfig(format!(
                "tier thresholds must descend: critical {} >= high {} >= moderate {}",
                d.critical, d.high, d.moderate
            )));
        }

        Ok(())
    }
}
