//! Error types for tunecheck-engine
//!
//! Per-item failures during the offline build or verification are recoverable
//! and logged; request-level failures abort only the request that hit them.

use std::path::PathBuf;
use thiserror::Error;

/// Remediation hint attached to [`DetectError::MissingIndex`]
pub const BUILD_REMEDIATION: &str =
    "run `tunecheck build-index` to build the reference index and corpus statistics";

/// Detection pipeline error
#[derive(Debug, Error)]
pub enum DetectError {
    /// Index, metadata or statistics files absent at query time (fatal for the request)
    #[error("Reference index not found at {path}: {remediation}")]
    MissingIndex { path: PathBuf, remediation: String },

    /// Embedding failed for one source file (offline build skips the file)
    #[error("Embedding extraction failed for {path}: {reason}")]
    EmbeddingExtraction { path: PathBuf, reason: String },

    /// Melody alignment failed for one candidate (substituted with a zero score)
    #[error("Alignment failed for candidate '{candidate}': {reason}")]
    Alignment { candidate: String, reason: String },

    /// Reference audio for a voted track could not be located
    #[error("Reference audio not found for '{name}'")]
    FileResolution { name: String },

    /// Index entries and their aligned metadata disagree (fatal for the request)
    #[error("Index/corpus mismatch: {0}")]
    IndexCorpusMismatch(String),

    /// Offline build produced no embeddings at all
    #[error("No reference tracks could be embedded from {0}")]
    EmptyCorpus(PathBuf),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Query audio could not be decoded or embedded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Reference directory could not be scanned
    #[error("Scan error: {0}")]
    Scan(#[from] crate::scanner::ScanError),

    /// Background task panicked or was aborted
    #[error("Background task failed: {0}")]
    Task(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON artifact error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// tunecheck-common error
    #[error("Common error: {0}")]
    Common(#[from] tunecheck_common::Error),
}

impl DetectError {
    /// Missing-index error with the standard remediation message
    pub fn missing_index(path: impl Into<PathBuf>) -> Self {
        DetectError::MissingIndex {
            path: path.into(),
            remediation: BUILD_REMEDIATION.to_string(),
        }
    }

    /// Per-item errors that the pipeline substitutes or skips instead of aborting
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DetectError::EmbeddingExtraction { .. }
                | DetectError::Alignment { .. }
                | DetectError::FileResolution { .. }
        )
    }
}

/// Result type for the detection pipeline
pub type DetectResult<T> = Result<T, DetectError>;
