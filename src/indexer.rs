//! Index lifecycle: startup bootstrap, change-driven rebuilds, and status.
//!
//! Ties the [`ChangeDetector`] to the [`IndexStore`]. The fingerprint table
//! is written as soon as a change is detected, so a rebuild that fails
//! afterwards clears the table again; otherwise the next check would see
//! matching fingerprints and keep serving the stale index.

use std::sync::Arc;
use tracing::{info, warn};

use crate::change::{ChangeDetector, Reindex};
use crate::config::Config;
use crate::corpus;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::index::{IndexMetadata, IndexStore, VectorIndex};
use crate::models::Chunk;
use crate::store::KvStore;

pub struct Indexer {
    detector: ChangeDetector,
    index_store: IndexStore,
    embedder: Arc<dyn Embedder>,
}

/// Snapshot of corpus and index state, as printed by `pchat status`.
#[derive(Debug)]
pub struct IndexStatus {
    pub documents: usize,
    pub fingerprints_stored: usize,
    pub up_to_date: bool,
    pub index: Option<IndexMetadata>,
    pub configured_model: String,
}

impl IndexStatus {
    /// True when the persisted index was embedded with a different model.
    pub fn model_mismatch(&self) -> bool {
        self.index
            .as_ref()
            .map(|m| m.model != self.configured_model)
            .unwrap_or(false)
    }
}

impl Indexer {
    pub fn new(config: &Config, store: Arc<dyn KvStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            detector: ChangeDetector::new(
                store,
                config.corpus.clone(),
                config.chunking.clone(),
            ),
            index_store: IndexStore::new(&config.index.path, config.embedding.batch_size),
            embedder,
        }
    }

    /// Produces the index to serve at startup.
    ///
    /// A missing index is always built, even when the fingerprint table says
    /// nothing changed. A present index is rebuilt only on change.
    pub async fn bootstrap(&self) -> Result<VectorIndex> {
        if !self.index_store.exists() {
            info!(
                path = %self.index_store.path().display(),
                "vector index missing, building"
            );
            let chunks = match self.detector.needs_reindex().await? {
                Reindex::Changed(chunks) => chunks,
                Reindex::Unchanged => self.detector.reload_all().await?,
            };
            return self.build(&chunks).await;
        }

        match self.detector.needs_reindex().await? {
            Reindex::Changed(chunks) => self.build(&chunks).await,
            Reindex::Unchanged => self.index_store.load().await,
        }
    }

    /// Rebuilds when the corpus changed. `None` means the index is current.
    pub async fn refresh(&self) -> Result<Option<VectorIndex>> {
        match self.detector.needs_reindex().await? {
            Reindex::Changed(chunks) => self.build(&chunks).await.map(Some),
            Reindex::Unchanged => Ok(None),
        }
    }

    /// Rebuilds from every document regardless of fingerprints.
    pub async fn rebuild_all(&self) -> Result<VectorIndex> {
        let chunks = self.detector.reload_all().await?;
        self.build(&chunks).await
    }

    pub async fn status(&self) -> Result<IndexStatus> {
        let files = corpus::list_files(self.detector.corpus())?;
        let current = self.detector.current_fingerprints(&files)?;
        let stored = self.detector.stored_fingerprints().await?;

        Ok(IndexStatus {
            documents: files.len(),
            fingerprints_stored: stored.len(),
            up_to_date: current == stored && self.index_store.exists(),
            index: self.index_store.metadata().await?,
            configured_model: self.embedder.model_name().to_string(),
        })
    }

    async fn build(&self, chunks: &[Chunk]) -> Result<VectorIndex> {
        match self.index_store.build(chunks, self.embedder.as_ref()).await {
            Ok(index) => Ok(index),
            Err(e) => {
                warn!(error = %e, "index build failed, clearing fingerprint table");
                if let Err(clear) = self.detector.forget().await {
                    warn!(error = %clear, "failed to clear fingerprint table");
                }
                Err(e)
            }
        }
    }
}
