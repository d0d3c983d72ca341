//! Offline reference index build
//!
//! Embeds every reference file in parallel (rayon), chunks the embeddings,
//! and assembles a complete [`IndexSnapshot`] with fresh corpus statistics
//! and, when a lyrics directory is given, the lyrics index.
//!
//! Files that fail to embed are logged and skipped. Output order follows the
//! sorted file names, so rebuilding an unchanged corpus yields the same index.

use crate::chunker::Chunker;
use crate::config::ChunkingConfig;
use crate::embedding::{AudioEmbedder, TextEmbedder};
use crate::error::{DetectError, DetectResult};
use crate::index::{FlatIndex, IndexManifest, IndexSnapshot, LyricsCorpus, VectorIndex};
use crate::lyrics::read_lyrics;
use crate::scanner::{file_name_of, FileScanner};
use crate::types::{Chunk, ChunkMeta, CorpusStatistics};
use chrono::Utc;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use tunecheck_common::vector;
use uuid::Uuid;

/// Build stamp written into every manifest
pub fn builder_stamp(embedder: &str) -> String {
    format!(
        "{} {} ({}, built {}) embedder={}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("TUNECHECK_GIT_HASH"),
        env!("TUNECHECK_BUILT_AT"),
        embedder
    )
}

/// A snapshot plus what the build had to leave out
#[derive(Debug)]
pub struct BuildReport {
    pub snapshot: IndexSnapshot,
    /// Audio files that could not be embedded, with the reason
    pub skipped_audio: Vec<(PathBuf, String)>,
    /// Lyric files that could not be embedded, with the reason
    pub skipped_lyrics: Vec<(PathBuf, String)>,
}

/// Corpus baseline: inner product of every chunk with the corpus centroid
pub fn corpus_statistics(index: &FlatIndex) -> Option<CorpusStatistics> {
    let rows: Vec<&[f32]> = index.rows().collect();
    let centroid = vector::mean(&rows)?;
    let similarities: Vec<f64> = rows
        .iter()
        .map(|row| vector::dot(row, &centroid) as f64)
        .collect();
    let (mean, std) = vector::mean_std(&similarities)?;
    Some(CorpusStatistics {
        mean_similarity: mean,
        std_similarity: std,
    })
}

/// Build a fresh snapshot from the reference directories
///
/// # Errors
/// - the songs directory is missing or unreadable
/// - no reference track yields a single chunk (`EmptyCorpus`)
pub fn build_index(
    songs_dir: &Path,
    lyrics_dir: Option<&Path>,
    audio: &dyn AudioEmbedder,
    text: &dyn TextEmbedder,
    chunking: &ChunkingConfig,
) -> DetectResult<BuildReport> {
    let started = Instant::now();
    let files = FileScanner::audio().scan(songs_dir)?;
    info!(dir = %songs_dir.display(), files = files.len(), "Embedding reference audio");

    let chunker = Chunker::new(chunking);
    let dimension = audio.dimension();

    // par_iter keeps input order in the collected output
    let embedded: Vec<(PathBuf, DetectResult<Vec<Chunk>>)> = files
        .par_iter()
        .map(|path| {
            let name = file_name_of(path);
            let result = audio.embed(path).and_then(|frames| {
                if let Some(bad) = frames.iter().find(|f| f.len() != dimension) {
                    return Err(DetectError::EmbeddingExtraction {
                        path: path.clone(),
                        reason: format!("vector dimension {} != {}", bad.len(), dimension),
                    });
                }
                Ok(chunker.chunk(&name, &frames))
            });
            (path.clone(), result)
        })
        .collect();

    let mut index = FlatIndex::new(dimension);
    let mut meta: Vec<ChunkMeta> = Vec::new();
    let mut skipped_audio = Vec::new();
    let mut tracks = 0usize;

    for (path, result) in embedded {
        match result {
            Ok(chunks) if chunks.is_empty() => {
                warn!(path = %path.display(), "No chunks produced, skipping");
                skipped_audio.push((path, "no chunks".to_string()));
            }
            Ok(chunks) => {
                for chunk in &chunks {
                    index.add(&chunk.vector, meta.len())?;
                    meta.push(ChunkMeta::from(chunk));
                }
                tracks += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping reference file");
                skipped_audio.push((path, e.to_string()));
            }
        }
    }

    if index.is_empty() {
        return Err(DetectError::EmptyCorpus(songs_dir.to_path_buf()));
    }
    let stats = corpus_statistics(&index).ok_or_else(|| DetectError::EmptyCorpus(songs_dir.to_path_buf()))?;

    let (lyrics, skipped_lyrics) = match lyrics_dir {
        Some(dir) if dir.is_dir() => build_lyrics(dir, text)?,
        Some(dir) => {
            warn!(dir = %dir.display(), "Lyrics directory not found, building audio index only");
            (None, Vec::new())
        }
        None => (None, Vec::new()),
    };

    let snapshot = IndexSnapshot {
        manifest: IndexManifest {
            snapshot_id: Uuid::new_v4(),
            created_at: Utc::now(),
            builder: builder_stamp(audio.name()),
            dimension,
            audio_entries: index.len(),
            tracks,
            lyrics_entries: lyrics.as_ref().map(|l: &LyricsCorpus| l.names.len()),
            chunk_len: chunking.chunk_len,
            hop: chunking.hop,
        },
        audio: index,
        audio_meta: meta,
        stats,
        lyrics,
    };
    snapshot.validate()?;

    info!(
        tracks,
        chunks = snapshot.audio.len(),
        skipped = skipped_audio.len(),
        lyrics = snapshot.manifest.lyrics_entries.unwrap_or(0),
        mean_sim = stats.mean_similarity,
        std_sim = stats.std_similarity,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Reference index built"
    );

    Ok(BuildReport {
        snapshot,
        skipped_audio,
        skipped_lyrics,
    })
}

type LyricsBuild = (Option<LyricsCorpus>, Vec<(PathBuf, String)>);

fn build_lyrics(dir: &Path, text: &dyn TextEmbedder) -> DetectResult<LyricsBuild> {
    let files = FileScanner::lyrics().scan(dir)?;
    let embedded: Vec<(PathBuf, DetectResult<Vec<f32>>)> = files
        .par_iter()
        .map(|path| {
            let result = read_lyrics(path).and_then(|body| {
                if body.trim().is_empty() {
                    return Err(DetectError::EmbeddingExtraction {
                        path: path.clone(),
                        reason: "empty lyrics".to_string(),
                    });
                }
                text.embed(&body)
            });
            (path.clone(), result)
        })
        .collect();

    let mut index = FlatIndex::new(text.dimension());
    let mut names = Vec::new();
    let mut skipped = Vec::new();
    for (path, result) in embedded {
        match result.and_then(|v| index.add(&v, names.len())) {
            Ok(()) => names.push(file_name_of(&path)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping lyrics file");
                skipped.push((path, e.to_string()));
            }
        }
    }

    info!(dir = %dir.display(), entries = names.len(), skipped = skipped.len(), "Lyrics index built");
    if names.is_empty() {
        return Ok((None, skipped));
    }
    Ok((Some(LyricsCorpus { index, names }), skipped))
}
