//! Reference file resolution and name normalization
//!
//! Voted track names come from the index metadata, but the reference directory
//! may have been renamed or cleaned since the build. [`LayeredResolver`] tries,
//! in order: the exact file name, a normalized-name match, then the closest
//! normalized Levenshtein match above a cutoff.
//!
//! The approximate stage can pick the wrong file when two references have
//! near-identical names. Such resolutions are logged at `warn`.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Tokens that carry no identity in downloaded file names
const JUNK_TOKENS: &[&str] = &[
    "official", "video", "audio", "lyric", "lyrics", "hq", "hd", "4k", "128", "kbps",
    "savetube", "ytshorts",
];

/// Strip any directory part and the extension
pub fn base_name(name: &str) -> &str {
    let file = name.rsplit(['/', '\\']).next().unwrap_or(name);
    match file.rfind('.') {
        Some(dot) if dot > 0 && file[dot + 1..].chars().all(|c| c.is_ascii_alphanumeric()) => &file[..dot],
        _ => file,
    }
}

/// Canonical form of a track title for comparison
///
/// Separators become spaces, bracketed segments and junk tokens are removed,
/// the result is lower-cased with single spaces.
pub fn normalize_name(name: &str) -> String {
    let mut stripped = String::with_capacity(name.len());
    let mut depth = 0usize;
    for c in name.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            '-' | '_' if depth == 0 => stripped.push(' '),
            _ if depth == 0 => stripped.push(c),
            _ => {}
        }
    }

    stripped
        .to_lowercase()
        .split_whitespace()
        .filter(|token| !token.starts_with("www.") && !token.starts_with("savetube"))
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|token| !token.is_empty() && !JUNK_TOKENS.contains(token))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Key used to join audio and lyric candidates: normalized name without extension
pub fn match_key(name: &str) -> String {
    normalize_name(base_name(name))
}

/// Which stage located the file
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionMethod {
    Exact,
    Normalized,
    /// Normalized Levenshtein similarity of the chosen file
    Approximate(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub path: PathBuf,
    pub method: ResolutionMethod,
}

/// Strategy for locating a voted track's reference audio
pub trait FileResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Resolution>;
}

/// Exact, then normalized, then approximate lookup in one directory
#[derive(Debug, Clone)]
pub struct LayeredResolver {
    dir: PathBuf,
    cutoff: f64,
}

impl LayeredResolver {
    pub fn new(dir: impl Into<PathBuf>, cutoff: f64) -> Self {
        Self {
            dir: dir.into(),
            cutoff,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Regular files in the directory, sorted by name
    fn listing(&self) -> Vec<String> {
        let mut names: Vec<String> = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                .filter_map(|e| e.file_name().to_str().map(str::to_string))
                .collect(),
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Reference directory unreadable");
                Vec::new()
            }
        };
        names.sort();
        names
    }
}

impl FileResolver for LayeredResolver {
    fn resolve(&self, name: &str) -> Option<Resolution> {
        let file_name = Path::new(name).file_name()?;
        let exact = self.dir.join(file_name);
        if exact.is_file() {
            return Some(Resolution {
                path: exact,
                method: ResolutionMethod::Exact,
            });
        }

        let wanted = match_key(name);
        let listing = self.listing();

        if let Some(found) = listing.iter().find(|f| match_key(f) == wanted) {
            debug!(name, resolved = %found, "Reference resolved by normalized name");
            return Some(Resolution {
                path: self.dir.join(found),
                method: ResolutionMethod::Normalized,
            });
        }

        // First file wins ties since the listing is sorted
        let best = listing
            .iter()
            .map(|f| (strsim::normalized_levenshtein(&wanted, &match_key(f)), f))
            .filter(|(score, _)| *score >= self.cutoff)
            .fold(None::<(f64, &String)>, |best, candidate| match best {
                Some(b) if b.0 >= candidate.0 => Some(b),
                _ => Some(candidate),
            });

        match best {
            Some((score, found)) => {
                warn!(
                    name,
                    resolved = %found,
                    similarity = score,
                    "Reference resolved by approximate name match"
                );
                Some(Resolution {
                    path: self.dir.join(found),
                    method: ResolutionMethod::Approximate(score),
                })
            }
            None => {
                debug!(name, dir = %self.dir.display(), "Reference file not found");
                None
            }
        }
    }
}
