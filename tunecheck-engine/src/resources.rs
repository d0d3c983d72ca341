//! Process-wide detector resources
//!
//! Built once at startup and cloned into each request. The index snapshot is
//! loaded lazily on first use and only ever replaced whole: readers hold an
//! `Arc<IndexSnapshot>` for the duration of their request, so a concurrent
//! swap never exposes a partially built index.

use crate::config::{DetectorConfig, PathsConfig};
use crate::embedding::{
    AudioEmbedder, ChromaExtractor, FeatureExtractor, HashingTextEmbedder, LogMelEmbedder, TextEmbedder,
};
use crate::error::{DetectError, DetectResult};
use crate::index::{IndexSnapshot, SnapshotStore, VectorIndex};
use crate::resolver::{FileResolver, LayeredResolver};
use crate::verification::Verifier;
use std::sync::Arc;
use tokio::sync::{RwLock, Semaphore};
use tracing::info;

/// Embedding and feature providers
#[derive(Clone)]
pub struct Providers {
    pub audio: Arc<dyn AudioEmbedder>,
    pub text: Arc<dyn TextEmbedder>,
    pub features: Arc<dyn FeatureExtractor>,
}

impl Providers {
    /// Built-in DSP and hashing providers
    pub fn baseline(config: &DetectorConfig) -> Self {
        Self {
            audio: Arc::new(LogMelEmbedder::new()),
            text: Arc::new(HashingTextEmbedder::default()),
            features: Arc::new(ChromaExtractor::new(&config.verification)),
        }
    }
}

/// Shared handles for every request
#[derive(Clone)]
pub struct ResourceManager {
    config: Arc<DetectorConfig>,
    paths: PathsConfig,
    store: SnapshotStore,
    snapshot: Arc<RwLock<Option<Arc<IndexSnapshot>>>>,
    providers: Providers,
    verifier: Verifier,
}

impl ResourceManager {
    /// `paths` must already be resolved against the data folder
    pub fn new(config: DetectorConfig, paths: PathsConfig, providers: Providers) -> Self {
        let resolver: Arc<dyn FileResolver> = Arc::new(LayeredResolver::new(
            paths.songs_dir.clone(),
            config.verification.resolve_cutoff,
        ));
        let permits = Arc::new(Semaphore::new(config.verification.max_concurrent.max(1)));
        let verifier = Verifier::new(
            Arc::clone(&providers.features),
            resolver,
            permits,
            config.verification.clone(),
        );

        Self {
            store: SnapshotStore::new(paths.index_dir.clone()),
            config: Arc::new(config),
            paths,
            snapshot: Arc::new(RwLock::new(None)),
            providers,
            verifier,
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn paths(&self) -> &PathsConfig {
        &self.paths
    }

    pub fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn providers(&self) -> &Providers {
        &self.providers
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    /// Current snapshot, loading it from disk on first use
    pub async fn snapshot(&self) -> DetectResult<Arc<IndexSnapshot>> {
        if let Some(snapshot) = self.snapshot.read().await.as_ref() {
            return Ok(Arc::clone(snapshot));
        }

        let mut slot = self.snapshot.write().await;
        // Another request may have loaded it while we waited for the lock
        if let Some(snapshot) = slot.as_ref() {
            return Ok(Arc::clone(snapshot));
        }
        let loaded = Arc::new(self.load_from_disk().await?);
        *slot = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    /// Re-read the snapshot from disk and swap it in
    pub async fn reload(&self) -> DetectResult<Arc<IndexSnapshot>> {
        let loaded = Arc::new(self.load_from_disk().await?);
        self.install_arc(Arc::clone(&loaded)).await;
        Ok(loaded)
    }

    /// Swap in a snapshot that is already complete
    pub async fn install(&self, snapshot: IndexSnapshot) {
        self.install_arc(Arc::new(snapshot)).await;
    }

    async fn install_arc(&self, snapshot: Arc<IndexSnapshot>) {
        let id = snapshot.manifest.snapshot_id;
        *self.snapshot.write().await = Some(snapshot);
        info!(snapshot_id = %id, "Index snapshot swapped in");
    }

    async fn load_from_disk(&self) -> DetectResult<IndexSnapshot> {
        let store = self.store.clone();
        let snapshot = tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(|e| DetectError::Task(e.to_string()))??;

        if snapshot.audio.dimension() != self.providers.audio.dimension() {
            return Err(DetectError::IndexCorpusMismatch(format!(
                "index dimension {} does not match the audio embedder '{}' ({})",
                snapshot.audio.dimension(),
                self.providers.audio.name(),
                self.providers.audio.dimension()
            )));
        }
        Ok(snapshot)
    }
}
