//! Human-readable rendering of a check result

use crate::types::{CheckResult, ResultEntry};
use std::fmt::Write;

/// Qualitative reading of a channel score in [0,1]
pub fn channel_reason(score: f64) -> &'static str {
    if score >= 0.85 {
        "very close match"
    } else if score >= 0.70 {
        "partial overlap"
    } else {
        "some general similarity"
    }
}

fn reasons(entry: &ResultEntry) -> Vec<String> {
    let mut out = Vec::new();
    if entry.audio_score_percent > 0.0 {
        out.push(format!(
            "audio: {}",
            channel_reason(entry.audio_score_percent / 100.0)
        ));
    }
    if entry.lyrics_score_percent > 0.0 {
        out.push(format!(
            "lyrics: {}",
            channel_reason(entry.lyrics_score_percent / 100.0)
        ));
    }
    out
}

/// Render the verdict, rationale and top results as plain text
pub fn render_text(result: &CheckResult) -> String {
    let mut out = String::new();
    let verdict = &result.verdict;
    let rationale = &verdict.rationale;

    // Writing to a String cannot fail
    let _ = writeln!(out, "{}", result.decision);
    let _ = writeln!(
        out,
        "tier: {}  hybrid: {:.2}%  audio: {:.2}%  lyrics: {:.2}%",
        verdict.tier, result.hybrid_score_percent, result.audio_score_percent, result.lyrics_score_percent
    );
    if !rationale.candidate.is_empty() {
        let z = verdict
            .z_score
            .map(|z| format!("{:.2}", z))
            .unwrap_or_else(|| "n/a".to_string());
        let _ = writeln!(
            out,
            "trigger: {}  coverage: {:.2}  melody: {:.2}  z: {}",
            rationale.trigger, rationale.coverage, rationale.melody_score, z
        );
    }
    for note in &rationale.notes {
        let _ = writeln!(out, "note: {}", note);
    }

    if !result.top5_results.is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Top matches:");
    }
    for (rank, entry) in result.top5_results.iter().enumerate() {
        let _ = writeln!(
            out,
            "{:>2}. {}  hybrid {:.2}%  audio {:.2}%  lyrics {:.2}%",
            rank + 1,
            entry.song,
            entry.hybrid_score_percent,
            entry.audio_score_percent,
            entry.lyrics_score_percent
        );
        let reasons = reasons(entry);
        if !reasons.is_empty() {
            let _ = writeln!(out, "    {}", reasons.join("; "));
        }
    }
    out
}
