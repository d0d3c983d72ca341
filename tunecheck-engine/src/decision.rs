//! Verdict tiers
//!
//! Tiers are checked from most to least severe and the first whose trigger
//! holds wins:
//!
//! | tier     | trigger                               |
//! |----------|---------------------------------------|
//! | critical | `hybrid ≥ critical` or `z > zThreshold` |
//! | high     | `hybrid ≥ high`                       |
//! | moderate | `hybrid ≥ moderate`                   |
//! | low      | otherwise                             |
//!
//! Every fused candidate is classified; the verdict belongs to the one with
//! the highest tier (ties by hybrid score, then name).

use crate::config::DecisionConfig;
use crate::types::{Decision, FusedCandidate, Rationale, VerdictTier, VerificationStatus};
use std::cmp::Ordering;

/// Tier for one candidate plus the condition that produced it
pub fn classify(hybrid: f32, z: Option<f64>, config: &DecisionConfig) -> (VerdictTier, String) {
    if hybrid >= config.critical {
        return (VerdictTier::Critical, format!("hybrid >= {:.2}", config.critical));
    }
    if let Some(z) = z {
        if z > config.z_threshold {
            return (VerdictTier::Critical, format!("z {:.2} > {:.2}", z, config.z_threshold));
        }
    }
    if hybrid >= config.high {
        return (VerdictTier::High, format!("hybrid >= {:.2}", config.high));
    }
    if hybrid >= config.moderate {
        return (VerdictTier::Moderate, format!("hybrid >= {:.2}", config.moderate));
    }
    (VerdictTier::Low, format!("hybrid < {:.2}", config.moderate))
}

/// Verification notes worth surfacing, e.g. `"Song A.mp3: skipped-timeout"`
fn verification_notes(fused: &[FusedCandidate]) -> Vec<String> {
    fused
        .iter()
        .filter_map(|c| match &c.verification {
            VerificationStatus::Verified | VerificationStatus::NotShortlisted => None,
            VerificationStatus::Failed(reason) => {
                Some(format!("{}: {} ({})", c.song, c.verification.tag(), reason))
            }
            status => Some(format!("{}: {}", c.song, status.tag())),
        })
        .collect()
}

/// Verdict over all fused candidates
///
/// Every audio candidate carries its own z, including tracks outside the
/// verification shortlist. The verdict is the most severe tier over all of
/// them, so a low-coverage track far above the corpus baseline can outrank
/// the best-ranked track and becomes the rationale's candidate.
pub fn decide(fused: &[FusedCandidate], config: &DecisionConfig) -> Decision {
    let classified = fused.iter().map(|c| {
        let (tier, trigger) = classify(c.hybrid, c.z_score, config);
        (c, tier, trigger)
    });

    let best = classified.max_by(|(a, ta, _), (b, tb, _)| {
        ta.cmp(tb)
            .then(a.hybrid.partial_cmp(&b.hybrid).unwrap_or(Ordering::Equal))
            // max_by keeps the last maximum; reverse name so the smallest name wins
            .then_with(|| b.song.cmp(&a.song))
    });

    let notes = verification_notes(fused);
    match best {
        Some((candidate, tier, trigger)) => Decision {
            tier,
            fused_score: candidate.hybrid,
            z_score: candidate.z_score,
            rationale: Rationale {
                candidate: candidate.song.clone(),
                coverage: candidate.coverage,
                audio_fused: candidate.audio_fused,
                melody_score: candidate.melody_score,
                lyrics_score: candidate.lyrics_score,
                trigger,
                notes,
            },
        },
        None => Decision {
            tier: VerdictTier::Low,
            fused_score: 0.0,
            z_score: None,
            rationale: Rationale {
                candidate: String::new(),
                coverage: 0.0,
                audio_fused: 0.0,
                melody_score: 0.0,
                lyrics_score: 0.0,
                trigger: "no candidates".to_string(),
                notes,
            },
        },
    }
}

/// One-line human summary of a decision
pub fn summary(decision: &Decision) -> String {
    let song = &decision.rationale.candidate;
    match decision.tier {
        VerdictTier::Critical => format!("Strong similarity with '{}': possible plagiarism", song),
        VerdictTier::High => format!("High similarity with '{}': manual review recommended", song),
        VerdictTier::Moderate => format!("Moderate similarity with '{}': possibly inspired", song),
        VerdictTier::Low if song.is_empty() => "No similar reference found".to_string(),
        VerdictTier::Low => format!("Low similarity | closest: '{}'", song),
    }
}
