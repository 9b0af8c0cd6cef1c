//! Document change detection.
//!
//! Fingerprints every eligible file and compares the result with the table
//! persisted in the key-value store. Any difference (changed, added, or
//! removed file) reloads the whole corpus; per-file deltas are not computed.

use std::sync::Arc;
use tracing::info;

use crate::config::{ChunkingConfig, CorpusConfig};
use crate::corpus::{self, CorpusFile};
use crate::error::{ChatError, Result};
use crate::fingerprint::{fingerprint_file, FingerprintTable};
use crate::models::Chunk;
use crate::store::KvStore;

/// Store key holding the fingerprint table as a hash.
pub const FINGERPRINT_KEY: &str = "pdf_hashes";

/// Outcome of a change check.
#[derive(Debug)]
pub enum Reindex {
    /// Fingerprints match the persisted table.
    Unchanged,
    /// Something differs; carries the freshly loaded chunks of all documents.
    Changed(Vec<Chunk>),
}

impl Reindex {
    pub fn is_changed(&self) -> bool {
        matches!(self, Reindex::Changed(_))
    }
}

pub struct ChangeDetector {
    store: Arc<dyn KvStore>,
    corpus: CorpusConfig,
    chunking: ChunkingConfig,
}

impl ChangeDetector {
    pub fn new(store: Arc<dyn KvStore>, corpus: CorpusConfig, chunking: ChunkingConfig) -> Self {
        Self {
            store,
            corpus,
            chunking,
        }
    }

    pub fn corpus(&self) -> &CorpusConfig {
        &self.corpus
    }

    /// Fingerprints the current corpus, keyed by relative path.
    pub fn current_fingerprints(&self, files: &[CorpusFile]) -> Result<FingerprintTable> {
        files
            .iter()
            .map(|f| {
                fingerprint_file(&f.path)
                    .map(|digest| (f.relative.clone(), digest))
                    .map_err(|source| ChatError::Io {
                        path: f.path.clone(),
                        source,
                    })
            })
            .collect()
    }

    pub async fn stored_fingerprints(&self) -> Result<FingerprintTable> {
        Ok(self.store.hash_get_all(FINGERPRINT_KEY).await?)
    }

    /// Decides whether the index must be rebuilt.
    ///
    /// On change, loads and chunks every document and then replaces the
    /// persisted table wholesale.
    pub async fn needs_reindex(&self) -> Result<Reindex> {
        let files = corpus::list_files(&self.corpus)?;
        let current = self.current_fingerprints(&files)?;
        let stored = self.stored_fingerprints().await?;

        if stored == current {
            info!(documents = files.len(), "no changes in documents");
            return Ok(Reindex::Unchanged);
        }

        info!(
            documents = files.len(),
            previously = stored.len(),
            "documents have changed, reloading"
        );
        let chunks = self.load_and_record(&files, &current).await?;
        Ok(Reindex::Changed(chunks))
    }

    /// Loads every document regardless of fingerprints and records the
    /// current table. Used when the index is missing but the table matches.
    pub async fn reload_all(&self) -> Result<Vec<Chunk>> {
        let files = corpus::list_files(&self.corpus)?;
        let current = self.current_fingerprints(&files)?;
        info!(documents = files.len(), "reloading all documents");
        self.load_and_record(&files, &current).await
    }

    /// Drops the persisted table so the next check reports a change.
    pub async fn forget(&self) -> Result<()> {
        Ok(self.store.delete(FINGERPRINT_KEY).await?)
    }

    async fn load_and_record(
        &self,
        files: &[CorpusFile],
        current: &FingerprintTable,
    ) -> Result<Vec<Chunk>> {
        let chunks = corpus::load_chunks(files, &self.chunking)?;
        self.store.hash_replace(FINGERPRINT_KEY, current).await?;
        Ok(chunks)
    }
}
