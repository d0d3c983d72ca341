//! Candidate retrieval by chunk voting
//!
//! Every query chunk looks up its nearest reference chunks. Hits at or above
//! the similarity threshold vote for their track, at most once per query chunk
//! (the best hit for that track). Per track:
//!
//! - `coverage = hitCount / totalQueryChunks`
//! - `meanSimilarity = similaritySum / hitCount`
//! - `rank = α·coverage + (1−α)·meanSimilarity`
//!
//! Candidates are sorted by rank descending, ties by track name ascending.

use crate::config::RetrievalConfig;
use crate::error::{DetectError, DetectResult};
use crate::index::VectorIndex;
use crate::types::{CandidateScore, Chunk, ChunkMeta, VerificationStatus, VoteTally};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Accumulate votes from every query chunk
pub fn tally_votes(
    index: &dyn VectorIndex,
    meta: &[ChunkMeta],
    chunks: &[Chunk],
    config: &RetrievalConfig,
) -> DetectResult<BTreeMap<String, VoteTally>> {
    let mut tallies: BTreeMap<String, VoteTally> = BTreeMap::new();

    for chunk in chunks {
        let hits = index.search(&chunk.vector, config.neighbors_per_chunk)?;
        let mut voted: HashSet<&str> = HashSet::new();

        for hit in hits {
            if hit.score < config.similarity_threshold {
                continue;
            }
            let entry = meta.get(hit.id).ok_or_else(|| {
                DetectError::IndexCorpusMismatch(format!(
                    "index entry {} has no chunk metadata ({} entries)",
                    hit.id,
                    meta.len()
                ))
            })?;
            // Hits arrive best first, so the first one per track is its best
            if !voted.insert(entry.name.as_str()) {
                continue;
            }
            let tally = tallies.entry(entry.name.clone()).or_default();
            tally.hit_count += 1;
            tally.similarity_sum += hit.score;
        }
    }

    debug!(
        query_chunks = chunks.len(),
        tracks = tallies.len(),
        "Votes tallied"
    );
    Ok(tallies)
}

/// Turn tallies into ranked candidate scores
pub fn rank_candidates(
    tallies: &BTreeMap<String, VoteTally>,
    total_chunks: usize,
    config: &RetrievalConfig,
) -> Vec<CandidateScore> {
    if total_chunks == 0 {
        return Vec::new();
    }
    let alpha = config.coverage_weight;

    let mut candidates: Vec<CandidateScore> = tallies
        .iter()
        .filter(|(_, tally)| tally.hit_count > 0)
        .map(|(track, tally)| {
            let coverage = (tally.hit_count as f32 / total_chunks as f32).min(1.0);
            let mean_similarity = tally.similarity_sum / tally.hit_count as f32;
            CandidateScore {
                track_id: track.clone(),
                coverage,
                mean_similarity,
                rank_score: alpha * coverage + (1.0 - alpha) * mean_similarity,
                melody_score: None,
                verification: VerificationStatus::NotShortlisted,
            }
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.rank_score
            .partial_cmp(&a.rank_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.track_id.cmp(&b.track_id))
    });
    candidates
}

/// Ranked candidates for a chunked query
pub fn retrieve(
    index: &dyn VectorIndex,
    meta: &[ChunkMeta],
    chunks: &[Chunk],
    config: &RetrievalConfig,
) -> DetectResult<Vec<CandidateScore>> {
    let tallies = tally_votes(index, meta, chunks, config)?;
    Ok(rank_candidates(&tallies, chunks.len(), config))
}

/// Number of leading candidates that go to melody verification
pub fn shortlist_len(candidates: &[CandidateScore], config: &RetrievalConfig) -> usize {
    candidates.len().min(config.shortlist_size)
}
