//! Melody verification of the candidate shortlist
//!
//! Each shortlisted candidate is resolved to a reference file, its chroma
//! sequence extracted and aligned against the query with DTW. The work is
//! CPU-bound, so every job runs on the blocking pool:
//!
//! - `buffer_unordered(max_concurrent)` bounds jobs per request
//! - a process-wide [`Semaphore`] bounds jobs across all requests; the permit
//!   lives inside the blocking closure, so a job abandoned on timeout keeps
//!   its slot until it actually stops
//! - each job has its own time budget, and the whole stage has a request deadline
//!
//! A job that fails (unresolved file, decode or alignment error) gets a melody
//! score of 0 without affecting the other candidates. Jobs cut off by a time
//! budget are tagged [`VerificationStatus::SkippedTimeout`].

use crate::audio::ChromaFrame;
use crate::config::{MelodyTransform, VerificationConfig};
use crate::dtw::{self, AlignError};
use crate::embedding::FeatureExtractor;
use crate::error::DetectError;
use crate::resolver::FileResolver;
use crate::types::{CandidateScore, VerificationStatus};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Result of one verification job
#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Verified(f32),
    Unresolved,
    Failed(String),
    TimedOut,
}

impl Outcome {
    fn apply(self, candidate: &mut CandidateScore) {
        let (melody, status) = match self {
            Outcome::Verified(score) => (Some(score), VerificationStatus::Verified),
            Outcome::Unresolved => (Some(0.0), VerificationStatus::Unresolved),
            Outcome::Failed(reason) => (Some(0.0), VerificationStatus::Failed(reason)),
            Outcome::TimedOut => (None, VerificationStatus::SkippedTimeout),
        };
        candidate.melody_score = melody;
        candidate.verification = status;
    }
}

/// Shortlist verifier sharing extractor, resolver and the global job cap
#[derive(Clone)]
pub struct Verifier {
    extractor: Arc<dyn FeatureExtractor>,
    resolver: Arc<dyn FileResolver>,
    permits: Arc<Semaphore>,
    config: VerificationConfig,
}

impl Verifier {
    pub fn new(
        extractor: Arc<dyn FeatureExtractor>,
        resolver: Arc<dyn FileResolver>,
        permits: Arc<Semaphore>,
        config: VerificationConfig,
    ) -> Self {
        Self {
            extractor,
            resolver,
            permits,
            config,
        }
    }

    /// Verify the first `shortlist` candidates in place
    ///
    /// Candidates past the shortlist are left untouched. Cancelling `cancel`
    /// stops outstanding jobs the same way the request deadline does.
    pub async fn verify(
        &self,
        query: &Path,
        candidates: &mut [CandidateScore],
        shortlist: usize,
        cancel: &CancellationToken,
    ) {
        let shortlist = shortlist.min(candidates.len());
        if shortlist == 0 {
            return;
        }
        let started = Instant::now();
        let deadline = started + Duration::from_millis(self.config.request_timeout_ms);
        let stage = cancel.child_token();

        let extraction = tokio::select! {
            result = tokio::time::timeout_at(deadline, self.query_chroma(query, &stage)) => result,
            _ = stage.cancelled() => {
                self.mark_all(&mut candidates[..shortlist], Outcome::TimedOut);
                return;
            }
        };
        let query_frames = match extraction {
            Ok(Ok(frames)) => Arc::new(frames),
            Ok(Err(outcome)) => {
                self.mark_all(&mut candidates[..shortlist], outcome);
                return;
            }
            Err(_) => {
                stage.cancel();
                warn!(query = %query.display(), "Query chroma extraction exceeded the request budget");
                self.mark_all(&mut candidates[..shortlist], Outcome::TimedOut);
                return;
            }
        };

        let jobs: Vec<(usize, String)> = candidates[..shortlist]
            .iter()
            .enumerate()
            .map(|(pos, c)| (pos, c.track_id.clone()))
            .collect();

        let mut results = stream::iter(jobs)
            .map(|(pos, name)| {
                let query_frames = Arc::clone(&query_frames);
                let stage = stage.clone();
                async move { (pos, self.verify_candidate(name, query_frames, &stage).await) }
            })
            .buffer_unordered(self.config.max_concurrent.max(1));

        let mut outcomes: HashMap<usize, Outcome> = HashMap::new();
        let sleep = tokio::time::sleep_until(deadline);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                next = results.next() => match next {
                    Some((pos, outcome)) => {
                        outcomes.insert(pos, outcome);
                    }
                    None => break,
                },
                _ = &mut sleep => {
                    warn!(
                        budget_ms = self.config.request_timeout_ms,
                        finished = outcomes.len(),
                        shortlist,
                        "Verification request budget exhausted, cancelling outstanding jobs"
                    );
                    break;
                }
                _ = stage.cancelled() => {
                    debug!("Verification cancelled by caller");
                    break;
                }
            }
        }
        // Stops blocking jobs still running at their next alignment row
        stage.cancel();
        drop(results);

        for (pos, candidate) in candidates[..shortlist].iter_mut().enumerate() {
            outcomes.remove(&pos).unwrap_or(Outcome::TimedOut).apply(candidate);
        }

        info!(
            shortlist,
            verified = candidates[..shortlist]
                .iter()
                .filter(|c| c.verification == VerificationStatus::Verified)
                .count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Melody verification complete"
        );
    }

    fn mark_all(&self, candidates: &mut [CandidateScore], outcome: Outcome) {
        for candidate in candidates {
            outcome.clone().apply(candidate);
        }
    }

    /// Chroma of the query, extracted once per request
    async fn query_chroma(
        &self,
        query: &Path,
        stage: &CancellationToken,
    ) -> Result<Vec<ChromaFrame>, Outcome> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| Outcome::Failed(e.to_string()))?;

        let extractor = Arc::clone(&self.extractor);
        let path = query.to_path_buf();
        let max_secs = self.config.max_duration_secs;
        let stage = stage.clone();

        let handle = tokio::task::spawn_blocking(move || {
            // Held until the blocking work ends, even if the caller stopped waiting
            let _permit = permit;
            if stage.is_cancelled() {
                return Err(Outcome::TimedOut);
            }
            extractor.chroma(&path, max_secs).map_err(|e| {
                warn!(query = %path.display(), error = %e, "Query chroma extraction failed");
                Outcome::Failed(e.to_string())
            })
        });

        handle.await.map_err(|e| Outcome::Failed(e.to_string()))?
    }

    async fn verify_candidate(
        &self,
        name: String,
        query_frames: Arc<Vec<ChromaFrame>>,
        stage: &CancellationToken,
    ) -> Outcome {
        let permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => return Outcome::Failed(e.to_string()),
        };
        if stage.is_cancelled() {
            return Outcome::TimedOut;
        }

        let job = stage.child_token();
        let handle = {
            let extractor = Arc::clone(&self.extractor);
            let resolver = Arc::clone(&self.resolver);
            let name = name.clone();
            let job = job.clone();
            let max_secs = self.config.max_duration_secs;
            let transform = self.config.melody_transform;
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                run_job(
                    extractor.as_ref(),
                    resolver.as_ref(),
                    &name,
                    &query_frames,
                    max_secs,
                    transform,
                    &job,
                )
            })
        };

        let budget = Duration::from_millis(self.config.candidate_timeout_ms);
        let outcome = match tokio::time::timeout(budget, handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_error)) => Outcome::Failed(join_error.to_string()),
            Err(_) => {
                job.cancel();
                warn!(
                    candidate = %name,
                    budget_ms = self.config.candidate_timeout_ms,
                    "Candidate verification timed out"
                );
                Outcome::TimedOut
            }
        };

        match &outcome {
            Outcome::Verified(score) => {
                debug!(candidate = %name, melody_score = score, "Candidate verified")
            }
            Outcome::Unresolved => {
                warn!(error = %DetectError::FileResolution { name: name.clone() }, "Skipping melody verification")
            }
            Outcome::Failed(reason) => warn!(
                error = %DetectError::Alignment {
                    candidate: name.clone(),
                    reason: reason.clone(),
                },
                "Substituting zero melody score"
            ),
            Outcome::TimedOut => {}
        }
        outcome
    }
}

/// Blocking body of one candidate job
fn run_job(
    extractor: &dyn FeatureExtractor,
    resolver: &dyn FileResolver,
    name: &str,
    query: &[ChromaFrame],
    max_secs: f32,
    transform: MelodyTransform,
    job: &CancellationToken,
) -> Outcome {
    let Some(resolution) = resolver.resolve(name) else {
        return Outcome::Unresolved;
    };
    if job.is_cancelled() {
        return Outcome::TimedOut;
    }
    let reference_path: PathBuf = resolution.path;
    let reference = match extractor.chroma(&reference_path, max_secs) {
        Ok(frames) => frames,
        Err(e) => return Outcome::Failed(e.to_string()),
    };
    match dtw::melody_score(query, &reference, transform, || job.is_cancelled()) {
        Ok(score) => Outcome::Verified(score),
        Err(AlignError::Cancelled) => Outcome::TimedOut,
        Err(e) => Outcome::Failed(e.to_string()),
    }
}
