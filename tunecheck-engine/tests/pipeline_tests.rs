//! End-to-end pipeline tests on a synthetic corpus
//!
//! Uses the text-vector fake providers so similarities are exact and the
//! tests run without decoding audio.

mod helpers;

use helpers::{fake_resources, track_vectors, write_vectors};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tunecheck_engine::types::VerdictTier;
use tunecheck_engine::{build_index, DetectError, Detector, DetectorConfig, ResourceManager};

const SONG_A_LYRICS: &str = "we were dancing in the moonlight\nholding on to summer nights\nnever let the music die";
const SONG_B_LYRICS: &str = "rain falls on an empty street\ncold coffee and a broken clock\nwaiting for the train";

struct Corpus {
    dir: TempDir,
}

impl Corpus {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let songs = dir.path().join("songs");
        let lyrics = dir.path().join("lyrics");
        std::fs::create_dir_all(&songs).unwrap();
        std::fs::create_dir_all(&lyrics).unwrap();

        write_vectors(&songs.join("Song A.wav"), &track_vectors(0, 40));
        write_vectors(&songs.join("Song B.wav"), &track_vectors(1, 40));
        write_vectors(&songs.join("Ghost Track.wav"), &track_vectors(2, 40));
        std::fs::write(lyrics.join("Song A.txt"), SONG_A_LYRICS).unwrap();
        std::fs::write(lyrics.join("Song B.txt"), SONG_B_LYRICS).unwrap();

        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn songs(&self) -> PathBuf {
        self.path().join("songs")
    }

    fn query(&self, name: &str, vectors: &[Vec<f32>]) -> PathBuf {
        write_vectors(&self.path().join(name), vectors)
    }

    fn lyrics_file(&self, name: &str, text: &str) -> PathBuf {
        let path = self.path().join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    /// Build and persist a snapshot, returning resources that will load it
    fn build(&self) -> ResourceManager {
        let resources = fake_resources(self.path(), DetectorConfig::default());
        let providers = resources.providers().clone();
        let built = build_index(
            &resources.paths().songs_dir,
            Some(resources.paths().lyrics_dir.as_path()),
            providers.audio.as_ref(),
            providers.text.as_ref(),
            &resources.config().chunking,
        )
        .unwrap();
        resources.store().save(&built.snapshot).unwrap();
        resources
    }
}

#[tokio::test]
async fn test_copied_track_without_lyrics() {
    let corpus = Corpus::new();
    let detector = Detector::new(corpus.build());
    let query = corpus.query("query.wav", &track_vectors(0, 40));

    let result = detector.check(&query, None).await.unwrap();

    assert_eq!(result.top5_results.len(), 1);
    let top = &result.top5_results[0];
    assert_eq!(top.song, "Song A.wav");
    assert_eq!(result.lyrics_score_percent, 0.0);
    // No lyrics: hybrid is exactly γ·audioFused
    assert!((top.hybrid_score_percent - 0.6 * top.audio_score_percent).abs() < 0.011);
    assert!((top.hybrid_score_percent - 60.0).abs() < 0.011);

    // Far above the corpus baseline, so critical even though hybrid is 0.6
    assert_eq!(result.verdict.tier, VerdictTier::Critical);
    assert!(result.verdict.rationale.trigger.starts_with("z "));
    assert!(result.verdict.z_score.unwrap() > 2.0);
    assert!(result.verdict.rationale.melody_score > 0.99);
    assert!((result.verdict.rationale.coverage - 1.0).abs() < 1e-6);
    assert!(result.decision.starts_with("Strong similarity with 'Song A.wav'"));
}

#[tokio::test]
async fn test_matching_lyrics_lift_hybrid() {
    let corpus = Corpus::new();
    let detector = Detector::new(corpus.build());
    let query = corpus.query("query.wav", &track_vectors(0, 40));
    let lyrics = corpus.lyrics_file("query.txt", SONG_A_LYRICS);

    let result = detector.check(&query, Some(lyrics.as_path())).await.unwrap();

    assert_eq!(result.top5_results[0].song, "Song A.wav");
    assert!(result.top5_results[0].lyrics_score_percent > 99.9);
    assert!(result.hybrid_score_percent > 99.9);
    assert_eq!(result.verdict.tier, VerdictTier::Critical);
    assert!(result.verdict.rationale.trigger.starts_with("hybrid >="));
    // The other lyric file shows up as a lyric-only candidate, never merged into Song A
    assert!(result
        .top5_results
        .iter()
        .all(|r| r.song != "Song B.txt" || r.audio_score_percent == 0.0));
}

#[tokio::test]
async fn test_unresolved_reference_keeps_vote_scores() {
    let corpus = Corpus::new();
    let detector = Detector::new(corpus.build());
    std::fs::remove_file(corpus.songs().join("Ghost Track.wav")).unwrap();
    let query = corpus.query("query.wav", &track_vectors(2, 40));

    let result = detector.check(&query, None).await.unwrap();

    let top = &result.top5_results[0];
    assert_eq!(top.song, "Ghost Track.wav");
    // audioFused = β·meanSimilarity with no melody contribution
    assert!((top.audio_score_percent - 70.0).abs() < 0.011);
    assert_eq!(result.verdict.rationale.melody_score, 0.0);
    assert!(result
        .verdict
        .rationale
        .notes
        .contains(&"Ghost Track.wav: unresolved-reference".to_string()));
}

#[tokio::test]
async fn test_unrelated_query_finds_nothing() {
    let corpus = Corpus::new();
    let detector = Detector::new(corpus.build());
    let query = corpus.query("noise.wav", &vec![vec![1.0f32; helpers::DIMENSION]; 40]);

    let result = detector.check(&query, None).await.unwrap();

    assert!(result.top5_results.is_empty());
    assert_eq!(result.verdict.tier, VerdictTier::Low);
    assert_eq!(result.decision, "No similar reference found");
    assert_eq!(result.hybrid_score_percent, 0.0);
}

#[tokio::test]
async fn test_missing_index_fails_request() {
    let corpus = Corpus::new();
    let detector = Detector::new(fake_resources(corpus.path(), DetectorConfig::default()));
    let query = corpus.query("query.wav", &track_vectors(0, 40));

    let err = detector.check(&query, None).await.unwrap_err();
    assert!(matches!(err, DetectError::MissingIndex { .. }));
}

#[tokio::test]
async fn test_truncated_metadata_is_a_mismatch() {
    let corpus = Corpus::new();
    let resources = corpus.build();
    let meta_path = resources.store().dir().join("audio_chunked_meta.json");
    let mut meta: Vec<serde_json::Value> =
        serde_json::from_str(&std::fs::read_to_string(&meta_path).unwrap()).unwrap();
    meta.pop();
    std::fs::write(&meta_path, serde_json::to_string(&meta).unwrap()).unwrap();

    let detector = Detector::new(fake_resources(corpus.path(), DetectorConfig::default()));
    let query = corpus.query("query.wav", &track_vectors(0, 40));
    let err = detector.check(&query, None).await.unwrap_err();
    assert!(matches!(err, DetectError::IndexCorpusMismatch(_)));
}

#[tokio::test]
async fn test_cancelled_verification_is_tagged() {
    let corpus = Corpus::new();
    let detector = Detector::new(corpus.build());
    let query = corpus.query("query.wav", &track_vectors(0, 40));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = detector.check_with_cancel(&query, None, &cancel).await.unwrap();

    assert_eq!(result.top5_results[0].song, "Song A.wav");
    assert!((result.top5_results[0].audio_score_percent - 70.0).abs() < 0.011);
    assert!(result
        .verdict
        .rationale
        .notes
        .contains(&"Song A.wav: skipped-timeout".to_string()));
}

#[tokio::test]
async fn test_concurrent_checks_agree() {
    let corpus = Corpus::new();
    let detector = Detector::new(corpus.build());
    let query = corpus.query("query.wav", &track_vectors(1, 40));

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let detector = detector.clone();
            let query = query.clone();
            tokio::spawn(async move { detector.check(&query, None).await })
        })
        .collect();

    let mut results = Vec::new();
    for handle in handles {
        results.push(handle.await.unwrap().unwrap());
    }
    for result in &results[1..] {
        assert_eq!(result.top5_results, results[0].top5_results);
        assert_eq!(result.verdict.tier, results[0].verdict.tier);
    }
    assert_eq!(results[0].top5_results[0].song, "Song B.wav");
}

#[tokio::test]
async fn test_reload_swaps_in_rebuilt_snapshot() {
    let corpus = Corpus::new();
    let resources = corpus.build();
    let first = resources.snapshot().await.unwrap();
    assert_eq!(first.manifest.tracks, 3);

    write_vectors(&corpus.songs().join("Song D.wav"), &track_vectors(1, 20));
    corpus.build();
    // Still the cached snapshot until reloaded
    assert_eq!(resources.snapshot().await.unwrap().manifest.snapshot_id, first.manifest.snapshot_id);

    let reloaded = resources.reload().await.unwrap();
    assert_eq!(reloaded.manifest.tracks, 4);
    assert_ne!(reloaded.manifest.snapshot_id, first.manifest.snapshot_id);
    // Readers holding the old snapshot keep a complete index
    assert_eq!(first.audio_meta.len(), first.manifest.audio_entries);
}

#[test]
fn test_build_skips_unreadable_files() {
    let corpus = Corpus::new();
    std::fs::write(corpus.songs().join("Broken.wav"), "not,a,vector").unwrap();
    let providers = helpers::fake_providers();

    let built = build_index(
        &corpus.songs(),
        None,
        providers.audio.as_ref(),
        providers.text.as_ref(),
        &DetectorConfig::default().chunking,
    )
    .unwrap();

    assert_eq!(built.skipped_audio.len(), 1);
    assert!(built.skipped_audio[0].0.ends_with("Broken.wav"));
    assert_eq!(built.snapshot.manifest.tracks, 3);
    // 40 units, chunk 10, hop 5: ⌊(40−10)/5⌋ + 1 = 7 chunks per track
    assert_eq!(built.snapshot.audio_meta.len(), 21);
    assert!(built.snapshot.lyrics.is_none());
}

#[test]
fn test_build_is_deterministic() {
    let corpus = Corpus::new();
    let providers = helpers::fake_providers();
    let chunking = DetectorConfig::default().chunking;
    let lyrics = corpus.path().join("lyrics");

    let first = build_index(&corpus.songs(), Some(lyrics.as_path()), providers.audio.as_ref(), providers.text.as_ref(), &chunking).unwrap();
    let second = build_index(&corpus.songs(), Some(lyrics.as_path()), providers.audio.as_ref(), providers.text.as_ref(), &chunking).unwrap();

    assert_eq!(first.snapshot.audio, second.snapshot.audio);
    assert_eq!(first.snapshot.audio_meta, second.snapshot.audio_meta);
    assert_eq!(first.snapshot.stats, second.snapshot.stats);
    assert_eq!(first.snapshot.lyrics, second.snapshot.lyrics);
    assert_eq!(first.snapshot.audio_meta[0].name, "Ghost Track.wav");
    assert_eq!(first.snapshot.audio_meta[0].time, "0-10s");
}

#[test]
fn test_empty_corpus_is_an_error() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("only.wav"), "").unwrap();
    let providers = helpers::fake_providers();

    let err = build_index(
        dir.path(),
        None,
        providers.audio.as_ref(),
        providers.text.as_ref(),
        &DetectorConfig::default().chunking,
    )
    .unwrap_err();
    assert!(matches!(err, DetectError::EmptyCorpus(_)));
}
