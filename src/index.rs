//! Vector index lifecycle: build, persist, load, search, hot swap.
//!
//! The persisted index is a single SQLite file holding every chunk's text and
//! embedding plus one metadata row. A build writes a fresh file next to the
//! target and renames it into place, so a reader never observes a partially
//! written index and a rebuild always replaces rather than merges.
//!
//! Search is brute-force cosine similarity over the in-memory copy, which is
//! plenty for a corpus of a few documents.

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use tracing::{info, warn};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob, Embedder};
use crate::error::{ChatError, Result};
use crate::models::Chunk;

/// A chunk with its embedding, as stored in the index.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub source: String,
    pub chunk_index: i64,
    pub text: String,
    pub vector: Vec<f32>,
}

/// A retrieval result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub source: String,
    pub text: String,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexMetadata {
    pub model: String,
    pub dims: usize,
    pub chunk_count: usize,
    pub built_at: DateTime<Utc>,
}

/// In-memory, immutable view of a built index.
#[derive(Debug)]
pub struct VectorIndex {
    chunks: Vec<IndexedChunk>,
    metadata: IndexMetadata,
}

impl VectorIndex {
    pub fn new(chunks: Vec<IndexedChunk>, metadata: IndexMetadata) -> Self {
        Self { chunks, metadata }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn metadata(&self) -> &IndexMetadata {
        &self.metadata
    }

    /// Returns at most `k` chunks ranked by descending similarity to
    /// `query_vec`.
    ///
    /// Candidates are drawn from the best `max(k, search_breadth)` matches.
    /// A candidate whose text repeats a better-ranked hit (the same passage
    /// in two documents, or a re-exported résumé) is skipped, so a wider pool
    /// backfills up to `k` distinct passages. Equal scores keep index order.
    pub fn search(&self, query_vec: &[f32], k: usize, search_breadth: usize) -> Vec<SearchHit> {
        let mut scored: Vec<(usize, f32)> = self
            .chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (i, cosine_similarity(query_vec, &c.vector)))
            .filter(|(_, score)| score.is_finite())
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k.max(search_breadth));

        let mut seen = HashSet::new();
        scored
            .into_iter()
            .filter(|(i, _)| seen.insert(self.chunks[*i].text.as_str()))
            .take(k)
            .map(|(i, score)| {
                let chunk = &self.chunks[i];
                SearchHit {
                    source: chunk.source.clone(),
                    text: chunk.text.clone(),
                    score,
                }
            })
            .collect()
    }
}

/// Persists and loads the index at a fixed path.
pub struct IndexStore {
    path: PathBuf,
    batch_size: usize,
}

impl IndexStore {
    pub fn new(path: impl Into<PathBuf>, batch_size: usize) -> Self {
        Self {
            path: path.into(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Embeds `chunks` and writes a fresh index, replacing any existing one.
    pub async fn build(&self, chunks: &[Chunk], embedder: &dyn Embedder) -> Result<VectorIndex> {
        if chunks.is_empty() {
            warn!("building an index with no chunks");
        }

        let mut indexed = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = embedder
                .embed(&texts)
                .await
                .map_err(|e| ChatError::Embedding(e.to_string()))?;
            if vectors.len() != batch.len() {
                return Err(ChatError::Embedding(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    vectors.len()
                )));
            }
            for (chunk, vector) in batch.iter().zip(vectors) {
                indexed.push(IndexedChunk {
                    source: chunk.source.clone(),
                    chunk_index: chunk.chunk_index,
                    text: chunk.text.clone(),
                    vector,
                });
            }
        }

        let metadata = IndexMetadata {
            model: embedder.model_name().to_string(),
            dims: indexed.first().map(|c| c.vector.len()).unwrap_or(0),
            chunk_count: indexed.len(),
            built_at: Utc::now(),
        };

        self.persist(&indexed, &metadata).await?;
        info!(
            path = %self.path.display(),
            chunks = metadata.chunk_count,
            model = %metadata.model,
            "vector index built"
        );

        Ok(VectorIndex::new(indexed, metadata))
    }

    /// Reads the persisted index.
    pub async fn load(&self) -> Result<VectorIndex> {
        if !self.exists() {
            return Err(ChatError::IndexNotFound(self.path.clone()));
        }

        let pool = connect(&self.path, true).await?;
        let result = read_index(&pool).await;
        pool.close().await;

        let index = result?;
        info!(
            path = %self.path.display(),
            chunks = index.len(),
            "vector index loaded"
        );
        Ok(index)
    }

    /// Reads only the metadata row, if an index exists.
    pub async fn metadata(&self) -> Result<Option<IndexMetadata>> {
        if !self.exists() {
            return Ok(None);
        }
        let pool = connect(&self.path, true).await?;
        let result = read_metadata(&pool).await;
        pool.close().await;
        result.map(Some)
    }

    async fn persist(&self, chunks: &[IndexedChunk], metadata: &IndexMetadata) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ChatError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let tmp = staging_path(&self.path);
        remove_if_exists(&tmp)?;

        let pool = connect(&tmp, false).await?;
        let written = write_index(&pool, chunks, metadata).await;
        pool.close().await;
        if let Err(e) = written {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }

        std::fs::rename(&tmp, &self.path).map_err(|source| ChatError::Io {
            path: self.path.clone(),
            source,
        })
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".building");
    path.with_file_name(name)
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ChatError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

async fn connect(path: &Path, read_only: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(!read_only)
        .read_only(read_only)
        .journal_mode(SqliteJournalMode::Delete);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    Ok(pool)
}

async fn write_index(
    pool: &SqlitePool,
    chunks: &[IndexedChunk],
    metadata: &IndexMetadata,
) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE chunks (
            position INTEGER PRIMARY KEY,
            source TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            text TEXT NOT NULL,
            embedding BLOB NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE index_meta (
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            chunk_count INTEGER NOT NULL,
            built_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    let mut tx = pool.begin().await?;

    for (position, chunk) in chunks.iter().enumerate() {
        sqlx::query(
            "INSERT INTO chunks (position, source, chunk_index, text, embedding) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(position as i64)
        .bind(&chunk.source)
        .bind(chunk.chunk_index)
        .bind(&chunk.text)
        .bind(vec_to_blob(&chunk.vector))
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("INSERT INTO index_meta (model, dims, chunk_count, built_at) VALUES (?, ?, ?, ?)")
        .bind(&metadata.model)
        .bind(metadata.dims as i64)
        .bind(metadata.chunk_count as i64)
        .bind(metadata.built_at.to_rfc3339())
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

async fn read_index(pool: &SqlitePool) -> Result<VectorIndex> {
    let metadata = read_metadata(pool).await?;

    let rows =
        sqlx::query("SELECT source, chunk_index, text, embedding FROM chunks ORDER BY position")
            .fetch_all(pool)
            .await?;

    let mut chunks = Vec::with_capacity(rows.len());
    for row in rows {
        let blob: Vec<u8> = row.try_get("embedding")?;
        chunks.push(IndexedChunk {
            source: row.try_get("source")?,
            chunk_index: row.try_get("chunk_index")?,
            text: row.try_get("text")?,
            vector: blob_to_vec(&blob),
        });
    }

    if chunks.len() != metadata.chunk_count {
        return Err(ChatError::Index(format!(
            "index metadata lists {} chunks but {} are stored",
            metadata.chunk_count,
            chunks.len()
        )));
    }

    Ok(VectorIndex::new(chunks, metadata))
}

async fn read_metadata(pool: &SqlitePool) -> Result<IndexMetadata> {
    let row = sqlx::query("SELECT model, dims, chunk_count, built_at FROM index_meta LIMIT 1")
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ChatError::Index("index metadata is missing".to_string()))?;

    let built_at: String = row.try_get("built_at")?;
    let built_at = DateTime::parse_from_rfc3339(&built_at)
        .map_err(|e| ChatError::Index(format!("invalid build timestamp: {}", e)))?
        .with_timezone(&Utc);
    let dims: i64 = row.try_get("dims")?;
    let chunk_count: i64 = row.try_get("chunk_count")?;

    Ok(IndexMetadata {
        model: row.try_get("model")?,
        dims: dims as usize,
        chunk_count: chunk_count as usize,
        built_at,
    })
}

/// The live index shared by request handlers.
///
/// Readers take an `Arc` snapshot and never block a rebuild for longer than
/// the pointer swap. Rebuilds serialize on a separate mutex.
pub struct IndexHandle {
    current: RwLock<Arc<VectorIndex>>,
    rebuild: Mutex<()>,
}

impl IndexHandle {
    pub fn new(index: VectorIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
            rebuild: Mutex::new(()),
        }
    }

    pub async fn snapshot(&self) -> Arc<VectorIndex> {
        self.current.read().await.clone()
    }

    pub async fn replace(&self, index: VectorIndex) {
        *self.current.write().await = Arc::new(index);
    }

    /// Held for the duration of a rebuild.
    pub async fn rebuild_guard(&self) -> MutexGuard<'_, ()> {
        self.rebuild.lock().await
    }
}
