//! Lyrics channel: text similarity against the reference lyrics index

use crate::embedding::TextEmbedder;
use crate::error::{DetectError, DetectResult};
use crate::index::{LyricsCorpus, VectorIndex};
use std::path::Path;
use tracing::debug;

/// One lyric retrieval hit
#[derive(Debug, Clone, PartialEq)]
pub struct LyricMatch {
    /// Reference lyric file name, e.g. `"Song A.txt"`
    pub name: String,
    pub score: f32,
}

/// Read a lyrics file as UTF-8, replacing invalid sequences
pub fn read_lyrics(path: &Path) -> DetectResult<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Top `k` reference lyrics for the query text
///
/// Blank text yields no matches. The corpus names list must stay aligned
/// with the index; a hit without a name is an `IndexCorpusMismatch`.
pub fn search_lyrics(
    corpus: &LyricsCorpus,
    embedder: &dyn TextEmbedder,
    text: &str,
    k: usize,
) -> DetectResult<Vec<LyricMatch>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    if corpus.index.len() != corpus.names.len() {
        return Err(DetectError::IndexCorpusMismatch(format!(
            "lyrics index has {} entries but {} names",
            corpus.index.len(),
            corpus.names.len()
        )));
    }

    let query = embedder.embed(text)?;
    let hits = corpus.index.search(&query, k)?;

    let matches = hits
        .into_iter()
        .map(|hit| {
            let name = corpus.names.get(hit.id).ok_or_else(|| {
                DetectError::IndexCorpusMismatch(format!("lyrics entry {} has no track name", hit.id))
            })?;
            Ok(LyricMatch {
                name: name.clone(),
                score: hit.score,
            })
        })
        .collect::<DetectResult<Vec<_>>>()?;

    debug!(
        matches = matches.len(),
        top = ?matches.first().map(|m| m.score),
        "Lyrics searched"
    );
    Ok(matches)
}
