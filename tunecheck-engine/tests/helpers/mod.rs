//! Test helper utilities
//!
//! Shared fixtures for the tunecheck-engine integration tests

#![allow(dead_code)]

pub mod audio_generator;
pub mod providers;

use std::path::Path;
use std::sync::Arc;
use tunecheck_engine::embedding::HashingTextEmbedder;
use tunecheck_engine::{DetectorConfig, Providers, ResourceManager};

pub use audio_generator::{generate_chord_wav, generate_tone_wav, repeat, AudioConfig, DISSONANT_LOOP, POP_LOOP};
pub use providers::{track_vectors, write_vectors, TextChromaExtractor, TextVectorEmbedder, DIMENSION};

/// Providers reading the fake vector format, with the real lyrics embedder
pub fn fake_providers() -> Providers {
    Providers {
        audio: Arc::new(TextVectorEmbedder),
        text: Arc::new(HashingTextEmbedder::default()),
        features: Arc::new(TextChromaExtractor),
    }
}

/// Resource manager rooted at `data_folder` with the fake providers
pub fn fake_resources(data_folder: &Path, config: DetectorConfig) -> ResourceManager {
    let paths = config.paths.resolved_against(data_folder);
    ResourceManager::new(config, paths, fake_providers())
}
