//! tunecheck-engine library interface
//!
//! Detects likely musical plagiarism of a query track against a reference
//! corpus. Audio is cut into overlapping chunks that vote for reference
//! tracks; the strongest candidates are verified by melody alignment; lyric
//! similarity and a corpus-relative anomaly score are fused into a tiered,
//! explained verdict.
//!
//! The offline [`indexer`] builds the reference snapshot; [`pipeline::Detector`]
//! answers queries against it.

pub mod audio;
pub mod chunker;
pub mod config;
pub mod decision;
pub mod dtw;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod index;
pub mod indexer;
pub mod lyrics;
pub mod pipeline;
pub mod report;
pub mod resolver;
pub mod resources;
pub mod retrieval;
pub mod scanner;
pub mod types;
pub mod verification;

pub use crate::config::DetectorConfig;
pub use crate::error::{DetectError, DetectResult};
pub use crate::indexer::{build_index, BuildReport};
pub use crate::pipeline::Detector;
pub use crate::resources::{Providers, ResourceManager};
pub use crate::types::CheckResult;
