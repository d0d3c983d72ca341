//! Persisted index snapshots
//!
//! A snapshot directory holds the audio index, its aligned chunk metadata, the
//! corpus statistics and the optional lyrics index:
//!
//! ```text
//! index/
//!   manifest.json              snapshot id, counts, build stamp
//!   audio_vectors.json         FlatIndex
//!   audio_chunked_meta.json    [{"name": "...", "time": "0-10s"}, ...]
//!   audio_stats.json           {"meanSim": .., "stdSim": .., "snapshot_id": ..}
//!   lyrics_vectors.json        FlatIndex (optional)
//!   lyrics_track_names.txt     one name per line, aligned with lyrics_vectors
//! ```
//!
//! Snapshots are never modified in place. `save` writes a complete staging
//! directory next to the target and swaps it in with renames.

use super::{FlatIndex, VectorIndex};
use crate::error::{DetectError, DetectResult};
use crate::types::{ChunkMeta, CorpusStatistics};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

const MANIFEST_FILE: &str = "manifest.json";
const AUDIO_VECTORS_FILE: &str = "audio_vectors.json";
const AUDIO_META_FILE: &str = "audio_chunked_meta.json";
const STATS_FILE: &str = "audio_stats.json";
const LYRICS_VECTORS_FILE: &str = "lyrics_vectors.json";
const LYRICS_NAMES_FILE: &str = "lyrics_track_names.txt";

/// Snapshot identity and summary counts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub snapshot_id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Build stamp of the binary that produced the snapshot
    pub builder: String,
    pub dimension: usize,
    pub audio_entries: usize,
    pub tracks: usize,
    pub lyrics_entries: Option<usize>,
    pub chunk_len: usize,
    pub hop: usize,
}

/// Statistics file layout: the baseline plus the snapshot it belongs to
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StatsFile {
    #[serde(flatten)]
    stats: CorpusStatistics,
    snapshot_id: Uuid,
}

/// Lyrics index with its position-aligned track names
#[derive(Debug, Clone, PartialEq)]
pub struct LyricsCorpus {
    pub index: FlatIndex,
    pub names: Vec<String>,
}

/// Everything the query path reads, loaded once and shared immutably
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSnapshot {
    pub manifest: IndexManifest,
    pub audio: FlatIndex,
    pub audio_meta: Vec<ChunkMeta>,
    pub stats: CorpusStatistics,
    pub lyrics: Option<LyricsCorpus>,
}

impl IndexSnapshot {
    /// Check positional alignment between every index and its metadata
    pub fn validate(&self) -> DetectResult<()> {
        if !self.audio.is_consistent() {
            return Err(DetectError::IndexCorpusMismatch(
                "audio index buffer does not match its entry count".to_string(),
            ));
        }
        if self.audio.len() != self.audio_meta.len() {
            return Err(DetectError::IndexCorpusMismatch(format!(
                "audio index has {} entries but chunk metadata has {}",
                self.audio.len(),
                self.audio_meta.len()
            )));
        }
        if self.manifest.dimension != self.audio.dimension() {
            return Err(DetectError::IndexCorpusMismatch(format!(
                "manifest dimension {} differs from audio index dimension {}",
                self.manifest.dimension,
                self.audio.dimension()
            )));
        }
        if let Some(lyrics) = &self.lyrics {
            if !lyrics.index.is_consistent() || lyrics.index.len() != lyrics.names.len() {
                return Err(DetectError::IndexCorpusMismatch(format!(
                    "lyrics index has {} entries but the names list has {}",
                    lyrics.index.len(),
                    lyrics.names.len()
                )));
            }
        }
        Ok(())
    }
}

/// Reads and atomically replaces the snapshot in one directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load and validate the snapshot
    ///
    /// Missing required files are [`DetectError::MissingIndex`]; statistics
    /// computed for a different snapshot are [`DetectError::IndexCorpusMismatch`].
    pub fn load(&self) -> DetectResult<IndexSnapshot> {
        for required in [MANIFEST_FILE, AUDIO_VECTORS_FILE, AUDIO_META_FILE, STATS_FILE] {
            let path = self.dir.join(required);
            if !path.is_file() {
                return Err(DetectError::missing_index(path));
            }
        }

        let manifest: IndexManifest = read_json(&self.dir.join(MANIFEST_FILE))?;
        let audio: FlatIndex = read_json(&self.dir.join(AUDIO_VECTORS_FILE))?;
        let audio_meta: Vec<ChunkMeta> = read_json(&self.dir.join(AUDIO_META_FILE))?;
        let stats_file: StatsFile = read_json(&self.dir.join(STATS_FILE))?;

        if stats_file.snapshot_id != manifest.snapshot_id {
            return Err(DetectError::IndexCorpusMismatch(format!(
                "corpus statistics belong to snapshot {} but the index is {}; rebuild the index",
                stats_file.snapshot_id, manifest.snapshot_id
            )));
        }

        let lyrics_vectors = self.dir.join(LYRICS_VECTORS_FILE);
        let lyrics_names = self.dir.join(LYRICS_NAMES_FILE);
        let lyrics = match (lyrics_vectors.is_file(), lyrics_names.is_file()) {
            (true, true) => {
                let index: FlatIndex = read_json(&lyrics_vectors)?;
                let names = std::fs::read_to_string(&lyrics_names)?
                    .lines()
                    .map(|l| l.trim().to_string())
                    .filter(|l| !l.is_empty())
                    .collect();
                Some(LyricsCorpus { index, names })
            }
            (false, false) => None,
            _ => {
                return Err(DetectError::IndexCorpusMismatch(
                    "lyrics index and lyrics names must be present together".to_string(),
                ))
            }
        };

        let snapshot = IndexSnapshot {
            manifest,
            audio,
            audio_meta,
            stats: stats_file.stats,
            lyrics,
        };
        snapshot.validate()?;

        info!(
            dir = %self.dir.display(),
            snapshot_id = %snapshot.manifest.snapshot_id,
            entries = snapshot.audio.len(),
            tracks = snapshot.manifest.tracks,
            lyrics = snapshot.lyrics.as_ref().map(|l| l.names.len()).unwrap_or(0),
            "Index snapshot loaded"
        );
        Ok(snapshot)
    }

    /// Write the snapshot into a staging directory, then swap it into place
    pub fn save(&self, snapshot: &IndexSnapshot) -> DetectResult<()> {
        snapshot.validate()?;

        let parent = self
            .dir
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(parent)?;

        let dir_name = self
            .dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("index");
        let staging = parent.join(format!(".{}.staging-{}", dir_name, snapshot.manifest.snapshot_id));
        if staging.exists() {
            std::fs::remove_dir_all(&staging)?;
        }
        std::fs::create_dir_all(&staging)?;

        write_json(&staging.join(AUDIO_VECTORS_FILE), &snapshot.audio)?;
        write_json(&staging.join(AUDIO_META_FILE), &snapshot.audio_meta)?;
        write_json(
            &staging.join(STATS_FILE),
            &StatsFile {
                stats: snapshot.stats,
                snapshot_id: snapshot.manifest.snapshot_id,
            },
        )?;
        if let Some(lyrics) = &snapshot.lyrics {
            write_json(&staging.join(LYRICS_VECTORS_FILE), &lyrics.index)?;
            let mut names = lyrics.names.join("\n");
            names.push('\n');
            std::fs::write(staging.join(LYRICS_NAMES_FILE), names)?;
        }
        // Manifest last: a staging dir without one is never mistaken for a snapshot
        write_json(&staging.join(MANIFEST_FILE), &snapshot.manifest)?;

        let retired = parent.join(format!(".{}.retired-{}", dir_name, Uuid::new_v4()));
        let had_previous = self.dir.exists();
        if had_previous {
            std::fs::rename(&self.dir, &retired)?;
        }
        if let Err(e) = std::fs::rename(&staging, &self.dir) {
            if had_previous {
                // Put the previous snapshot back so readers still find one
                std::fs::rename(&retired, &self.dir)?;
            }
            return Err(e.into());
        }
        if had_previous {
            if let Err(e) = std::fs::remove_dir_all(&retired) {
                warn!(path = %retired.display(), error = %e, "Could not remove retired snapshot");
            }
        }

        info!(
            dir = %self.dir.display(),
            snapshot_id = %snapshot.manifest.snapshot_id,
            "Index snapshot written"
        );
        Ok(())
    }
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> DetectResult<T> {
    debug!(path = %path.display(), "Reading snapshot file");
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    Ok(serde_json::from_reader(reader)?)
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> DetectResult<()> {
    let file = std::fs::File::create(path)?;
    let writer = std::io::BufWriter::new(file);
    serde_json::to_writer(writer, value)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn snapshot(with_lyrics: bool) -> IndexSnapshot {
        let audio = FlatIndex::from_vectors(2, &[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        IndexSnapshot {
            manifest: IndexManifest {
                snapshot_id: Uuid::new_v4(),
                created_at: Utc::now(),
                builder: "test".to_string(),
                dimension: 2,
                audio_entries: 2,
                tracks: 1,
                lyrics_entries: with_lyrics.then_some(1),
                chunk_len: 10,
                hop: 5,
            },
            audio,
            audio_meta: vec![
                ChunkMeta {
                    name: "a.mp3".into(),
                    time: "0-10s".into(),
                },
                ChunkMeta {
                    name: "a.mp3".into(),
                    time: "5-15s".into(),
                },
            ],
            stats: CorpusStatistics {
                mean_similarity: 0.5,
                std_similarity: 0.1,
            },
            lyrics: with_lyrics.then(|| LyricsCorpus {
                index: FlatIndex::from_vectors(2, &[vec![0.6, 0.8]]).unwrap(),
                names: vec!["a.txt".into()],
            }),
        }
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("index"));
        let original = snapshot(true);

        store.save(&original).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded.manifest.snapshot_id, original.manifest.snapshot_id);
        assert_eq!(loaded.audio, original.audio);
        assert_eq!(loaded.audio_meta, original.audio_meta);
        assert_eq!(loaded.stats, original.stats);
        assert_eq!(loaded.lyrics, original.lyrics);
    }

    #[test]
    fn test_save_replaces_previous_snapshot() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("index"));
        store.save(&snapshot(true)).unwrap();

        let second = snapshot(false);
        store.save(&second).unwrap();
        let loaded = store.load().unwrap();

        assert_eq!(loaded.manifest.snapshot_id, second.manifest.snapshot_id);
        assert!(loaded.lyrics.is_none());
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_missing_index_reported() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("index"));
        assert!(matches!(store.load(), Err(DetectError::MissingIndex { .. })));
    }

    #[test]
    fn test_stale_statistics_detected() {
        let dir = TempDir::new().unwrap();
        let store = SnapshotStore::new(dir.path().join("index"));
        store.save(&snapshot(false)).unwrap();

        let stale = StatsFile {
            stats: CorpusStatistics {
                mean_similarity: 0.4,
                std_similarity: 0.2,
            },
            snapshot_id: Uuid::new_v4(),
        };
        write_json(&store.dir().join(STATS_FILE), &stale).unwrap();

        assert!(matches!(store.load(), Err(DetectError::IndexCorpusMismatch(_))));
    }

    #[test]
    fn test_metadata_length_mismatch_detected() {
        let mut snap = snapshot(false);
        snap.audio_meta.pop();
        assert!(matches!(snap.validate(), Err(DetectError::IndexCorpusMismatch(_))));
    }

    #[test]
    fn test_lyrics_names_mismatch_detected() {
        let mut snap = snapshot(true);
        if let Some(lyrics) = snap.lyrics.as_mut() {
            lyrics.names.push("extra.txt".into());
        }
        assert!(matches!(snap.validate(), Err(DetectError::IndexCorpusMismatch(_))));
    }
}
