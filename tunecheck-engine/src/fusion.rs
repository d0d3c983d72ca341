//! Channel fusion and corpus-relative anomaly scoring
//!
//! ```text
//! audioFused = β·meanSimilarity + (1−β)·melodyScore
//! hybrid     = γ·audioFused     + (1−γ)·lyricsScore
//! z          = (meanSimilarity − corpusMean) / (corpusStd + ε)
//! ```
//!
//! Every channel score is clipped to [0,1] first. A channel with no score
//! contributes 0; its weight is not handed to the other channel.

use crate::config::FusionConfig;
use crate::lyrics::LyricMatch;
use crate::resolver::match_key;
use crate::types::{CandidateScore, CorpusStatistics, FusedCandidate, VerificationStatus};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Clamp to [0,1]; NaN becomes 0
pub fn clip(score: f32) -> f32 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

pub fn audio_fused(mean_similarity: f32, melody_score: f32, similarity_weight: f32) -> f32 {
    similarity_weight * clip(mean_similarity) + (1.0 - similarity_weight) * clip(melody_score)
}

pub fn hybrid(audio_fused: f32, lyrics_score: f32, audio_weight: f32) -> f32 {
    audio_weight * clip(audio_fused) + (1.0 - audio_weight) * clip(lyrics_score)
}

/// Standard deviations above the corpus baseline
pub fn z_score(similarity: f64, stats: &CorpusStatistics, epsilon: f64) -> f64 {
    (similarity - stats.mean_similarity) / (stats.std_similarity + epsilon)
}

/// Join audio candidates and lyric matches by base name and fuse their scores
///
/// Output is sorted by hybrid score descending, ties by song name.
pub fn fuse(
    candidates: &[CandidateScore],
    lyrics: &[LyricMatch],
    stats: &CorpusStatistics,
    config: &FusionConfig,
) -> Vec<FusedCandidate> {
    let mut lyric_scores: HashMap<String, (f32, &str)> = HashMap::new();
    for m in lyrics {
        let entry = lyric_scores.entry(match_key(&m.name)).or_insert((f32::MIN, m.name.as_str()));
        if m.score > entry.0 {
            *entry = (m.score, m.name.as_str());
        }
    }

    let mut fused: Vec<FusedCandidate> = Vec::with_capacity(candidates.len() + lyric_scores.len());

    for candidate in candidates {
        let lyrics_score = lyric_scores
            .remove(&match_key(&candidate.track_id))
            .map(|(score, _)| clip(score))
            .unwrap_or(0.0);
        let melody_score = clip(candidate.melody_score.unwrap_or(0.0));
        let audio = audio_fused(candidate.mean_similarity, melody_score, config.similarity_weight);

        fused.push(FusedCandidate {
            song: candidate.track_id.clone(),
            coverage: candidate.coverage,
            mean_similarity: candidate.mean_similarity,
            melody_score,
            audio_fused: audio,
            lyrics_score,
            hybrid: hybrid(audio, lyrics_score, config.audio_weight),
            z_score: Some(z_score(candidate.mean_similarity as f64, stats, config.z_epsilon)),
            verification: candidate.verification.clone(),
        });
    }

    // Lyric matches with no audio evidence
    for (score, name) in lyric_scores.into_values() {
        let lyrics_score = clip(score);
        fused.push(FusedCandidate {
            song: name.to_string(),
            coverage: 0.0,
            mean_similarity: 0.0,
            melody_score: 0.0,
            audio_fused: 0.0,
            lyrics_score,
            hybrid: hybrid(0.0, lyrics_score, config.audio_weight),
            z_score: None,
            verification: VerificationStatus::NotShortlisted,
        });
    }

    fused.sort_by(|a, b| {
        b.hybrid
            .partial_cmp(&a.hybrid)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.song.cmp(&b.song))
    });
    fused
}
