//! # Tunecheck Common Library
//!
//! Shared code for the tunecheck crates including:
//! - Error and result types
//! - Data folder resolution and bootstrap TOML configuration
//! - Vector math used by chunking, retrieval and alignment

pub mod config;
pub mod error;
pub mod vector;

pub use error::{Error, Result};
