//! Reference directory scanning
//!
//! Reference files are identified by their file name, so only the top level
//! of a reference directory is scanned. Hidden and system files are skipped.

use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
}

/// Extensions accepted as reference audio
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "oga", "m4a", "aac", "mp4", "wav", "opus"];

/// Extensions accepted as reference lyrics
pub const LYRICS_EXTENSIONS: &[&str] = &["txt"];

/// File scanner filtering by extension
#[derive(Debug, Clone)]
pub struct FileScanner {
    extensions: &'static [&'static str],
    ignore_patterns: Vec<String>,
}

impl FileScanner {
    pub fn audio() -> Self {
        Self::with_extensions(AUDIO_EXTENSIONS)
    }

    pub fn lyrics() -> Self {
        Self::with_extensions(LYRICS_EXTENSIONS)
    }

    fn with_extensions(extensions: &'static [&'static str]) -> Self {
        Self {
            extensions,
            ignore_patterns: vec![".DS_Store".to_string(), "Thumbs.db".to_string()],
        }
    }

    /// Matching files directly inside `dir`, sorted by file name
    pub fn scan(&self, dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !dir.exists() {
            return Err(ScanError::PathNotFound(dir.to_path_buf()));
        }
        if !dir.is_dir() {
            return Err(ScanError::NotADirectory(dir.to_path_buf()));
        }

        let mut files = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1).follow_links(true) {
            match entry {
                Ok(entry) if entry.file_type().is_file() && self.accepts(&entry) => {
                    files.push(entry.into_path());
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(dir = %dir.display(), error = %e, "Error accessing entry"),
            }
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

        tracing::debug!(dir = %dir.display(), files = files.len(), "Reference directory scanned");
        Ok(files)
    }

    fn accepts(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        if name.starts_with('.') || self.ignore_patterns.iter().any(|p| name.contains(p.as_str())) {
            return false;
        }
        entry
            .path()
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.contains(&ext.as_str()))
    }
}

/// File name as stored in index metadata
pub fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
