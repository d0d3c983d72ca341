//! Core data model for the detection pipeline
//!
//! Reference-side types (`ChunkMeta`, `CorpusStatistics`) are persisted with the
//! index snapshot. Everything else is built per request and dropped afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-dimension point in an acoustic or lexical similarity space
pub type EmbeddingVector = Vec<f32>;

/// Half-open range of embedding units `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: usize,
    pub end: usize,
}

impl TimeRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Persisted label, e.g. `"10-20s"`
    pub fn label(&self) -> String {
        format!("{}-{}s", self.start, self.end)
    }

    /// Parse a `"<start>-<end>s"` label
    pub fn parse_label(label: &str) -> Option<Self> {
        let body = label.strip_suffix('s')?;
        let (start, end) = body.split_once('-')?;
        let start = start.trim().parse().ok()?;
        let end = end.trim().parse().ok()?;
        (end >= start).then_some(TimeRange { start, end })
    }
}

/// One window of a track's embedding sequence, reduced to one vector
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub track_id: String,
    pub range: TimeRange,
    pub vector: EmbeddingVector,
}

/// Persisted chunk metadata, aligned by position with index entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMeta {
    pub name: String,
    pub time: String,
}

impl From<&Chunk> for ChunkMeta {
    fn from(chunk: &Chunk) -> Self {
        ChunkMeta {
            name: chunk.track_id.clone(),
            time: chunk.range.label(),
        }
    }
}

/// Per-track vote accumulation for one query
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct VoteTally {
    pub hit_count: usize,
    pub similarity_sum: f32,
}

/// How melody verification went for one candidate
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationStatus {
    /// Alignment ran; the score is in `CandidateScore::melody_score`
    Verified,
    /// Candidate ranked below the shortlist
    NotShortlisted,
    /// No reference audio file could be resolved
    Unresolved,
    /// Extraction or alignment failed
    Failed(String),
    /// Cancelled by the candidate or request time budget
    SkippedTimeout,
}

impl VerificationStatus {
    /// Short tag used in the decision rationale
    pub fn tag(&self) -> &'static str {
        match self {
            VerificationStatus::Verified => "verified",
            VerificationStatus::NotShortlisted => "not-shortlisted",
            VerificationStatus::Unresolved => "unresolved-reference",
            VerificationStatus::Failed(_) => "alignment-failed",
            VerificationStatus::SkippedTimeout => "skipped-timeout",
        }
    }
}

/// Scores for one reference track
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub track_id: String,
    /// `hitCount / totalQueryChunks`, within [0,1]
    pub coverage: f32,
    /// `similaritySum / hitCount`
    pub mean_similarity: f32,
    /// Cheap ranking score `α·coverage + (1−α)·meanSimilarity`
    pub rank_score: f32,
    /// Melody verification score, `None` until verification ran
    pub melody_score: Option<f32>,
    pub verification: VerificationStatus,
}

/// Precomputed corpus baseline for anomaly scoring
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorpusStatistics {
    #[serde(rename = "meanSim")]
    pub mean_similarity: f64,
    #[serde(rename = "stdSim")]
    pub std_similarity: f64,
}

/// Verdict tiers ordered by severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerdictTier {
    Low,
    Moderate,
    High,
    Critical,
}

impl VerdictTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerdictTier::Low => "low",
            VerdictTier::Moderate => "moderate",
            VerdictTier::High => "high",
            VerdictTier::Critical => "critical",
        }
    }
}

impl fmt::Display for VerdictTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fused scores for one reference track across all channels
#[derive(Debug, Clone, PartialEq)]
pub struct FusedCandidate {
    /// Display name (audio file name when known, else lyric file name)
    pub song: String,
    pub coverage: f32,
    pub mean_similarity: f32,
    pub melody_score: f32,
    pub audio_fused: f32,
    pub lyrics_score: f32,
    pub hybrid: f32,
    /// Anomaly score from this candidate's audio similarity; `None` for lyric-only matches
    pub z_score: Option<f64>,
    pub verification: VerificationStatus,
}

/// Auditable sub-scores behind a verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rationale {
    pub candidate: String,
    pub coverage: f32,
    pub audio_fused: f32,
    pub melody_score: f32,
    pub lyrics_score: f32,
    /// Which condition produced the tier
    pub trigger: String,
    /// Verification notes such as `skipped-timeout` per candidate
    pub notes: Vec<String>,
}

/// Categorical, explained verdict for one query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub tier: VerdictTier,
    pub fused_score: f32,
    pub z_score: Option<f64>,
    pub rationale: Rationale,
}

/// One row of `top5_results`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    pub song: String,
    pub audio_score_percent: f64,
    pub lyrics_score_percent: f64,
    pub hybrid_score_percent: f64,
}

/// Query result returned by `check`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub audio_score_percent: f64,
    pub lyrics_score_percent: f64,
    pub hybrid_score_percent: f64,
    pub decision: String,
    pub top5_results: Vec<ResultEntry>,
    /// Structured verdict behind `decision`
    pub verdict: Decision,
}

/// Score in [0,1] as a percentage rounded to two decimals
pub fn to_percent(score: f32) -> f64 {
    (score as f64 * 10_000.0).round() / 100.0
}
