//! Query pipeline
//!
//! ```text
//! embed → chunk → vote → shortlist → verify (bounded pool) → lyrics → fuse → decide
//! ```
//!
//! Optional channels degrade instead of failing: no lyrics file, an unreadable
//! lyrics file or a snapshot without a lyrics index all leave the lyrics
//! channel at 0. Missing or inconsistent index data aborts the request.

use crate::chunker::Chunker;
use crate::decision::{decide, summary};
use crate::error::{DetectError, DetectResult};
use crate::fusion::fuse;
use crate::index::IndexSnapshot;
use crate::lyrics::{read_lyrics, search_lyrics, LyricMatch};
use crate::resources::ResourceManager;
use crate::retrieval::{retrieve, shortlist_len};
use crate::scanner::file_name_of;
use crate::types::{to_percent, CandidateScore, CheckResult, Decision, FusedCandidate, ResultEntry};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Runs `check` requests against the shared resources
#[derive(Clone)]
pub struct Detector {
    resources: ResourceManager,
}

impl Detector {
    pub fn new(resources: ResourceManager) -> Self {
        Self { resources }
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    /// Check one query file, optionally with its lyrics
    pub async fn check(&self, query: &Path, lyrics: Option<&Path>) -> DetectResult<CheckResult> {
        self.check_with_cancel(query, lyrics, &CancellationToken::new()).await
    }

    /// Like [`Detector::check`]; cancelling `cancel` stops melody verification
    /// early and the request completes with the scores gathered so far
    pub async fn check_with_cancel(
        &self,
        query: &Path,
        lyrics: Option<&Path>,
        cancel: &CancellationToken,
    ) -> DetectResult<CheckResult> {
        let started = Instant::now();
        let config = self.resources.config();
        let snapshot = self.resources.snapshot().await?;

        let mut candidates = self.audio_candidates(query, &snapshot).await?;
        let shortlist = shortlist_len(&candidates, &config.retrieval);
        self.resources
            .verifier()
            .verify(query, &mut candidates, shortlist, cancel)
            .await;

        let lyric_matches = match lyrics {
            Some(path) => self.lyric_matches(path, &snapshot)?,
            None => Vec::new(),
        };

        let fused = fuse(&candidates, &lyric_matches, &snapshot.stats, &config.fusion);
        let verdict = decide(&fused, &config.decision);
        let result = assemble(&fused, verdict, config.fusion.result_limit);

        info!(
            query = %query.display(),
            candidates = candidates.len(),
            lyric_matches = lyric_matches.len(),
            tier = %result.verdict.tier,
            hybrid_percent = result.hybrid_score_percent,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Check complete"
        );
        Ok(result)
    }

    /// Embed, chunk and vote; CPU work runs on the blocking pool
    async fn audio_candidates(
        &self,
        query: &Path,
        snapshot: &Arc<IndexSnapshot>,
    ) -> DetectResult<Vec<CandidateScore>> {
        let audio = Arc::clone(&self.resources.providers().audio);
        let snapshot = Arc::clone(snapshot);
        let chunker = Chunker::new(&self.resources.config().chunking);
        let retrieval = self.resources.config().retrieval.clone();
        let path = query.to_path_buf();

        tokio::task::spawn_blocking(move || {
            let frames = audio.embed(&path).map_err(|e| match e {
                // Per-file extraction errors are fatal for the query itself
                DetectError::EmbeddingExtraction { path, reason } => {
                    DetectError::Decode(format!("{}: {}", path.display(), reason))
                }
                other => other,
            })?;
            let chunks = chunker.chunk(&file_name_of(&path), &frames);
            debug!(query = %path.display(), frames = frames.len(), chunks = chunks.len(), "Query chunked");
            retrieve(&snapshot.audio, &snapshot.audio_meta, &chunks, &retrieval)
        })
        .await
        .map_err(|e| DetectError::Task(e.to_string()))?
    }

    fn lyric_matches(&self, path: &Path, snapshot: &IndexSnapshot) -> DetectResult<Vec<LyricMatch>> {
        let Some(corpus) = &snapshot.lyrics else {
            warn!("Snapshot has no lyrics index, lyrics channel contributes 0");
            return Ok(Vec::new());
        };
        let text = match read_lyrics(path) {
            Ok(text) => text,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Lyrics unreadable, lyrics channel contributes 0");
                return Ok(Vec::new());
            }
        };
        let top_k = self.resources.config().fusion.lyrics_top_k;
        search_lyrics(corpus, self.resources.providers().text.as_ref(), &text, top_k)
    }
}

/// Shape the fused ranking and verdict into the result document
fn assemble(fused: &[FusedCandidate], verdict: Decision, limit: usize) -> CheckResult {
    let best = |score: fn(&FusedCandidate) -> f32| fused.iter().map(score).fold(0.0f32, f32::max);

    CheckResult {
        audio_score_percent: to_percent(best(|c| c.audio_fused)),
        lyrics_score_percent: to_percent(best(|c| c.lyrics_score)),
        hybrid_score_percent: to_percent(verdict.fused_score),
        decision: summary(&verdict),
        top5_results: fused
            .iter()
            .take(limit)
            .map(|c| ResultEntry {
                song: c.song.clone(),
                audio_score_percent: to_percent(c.audio_fused),
                lyrics_score_percent: to_percent(c.lyrics_score),
                hybrid_score_percent: to_percent(c.hybrid),
            })
            .collect(),
        verdict,
    }
}
