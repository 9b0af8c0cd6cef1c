//! Document directory scanning and loading.
//!
//! Walks the corpus directory, applies include/exclude globs, and turns the
//! matching files into [`SourceDocument`]s and then [`Chunk`]s.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::PathBuf;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::chunk::chunk_text;
use crate::config::{ChunkingConfig, CorpusConfig};
use crate::error::{ChatError, Result};
use crate::extract::{content_type_for, extract_text};
use crate::models::{Chunk, SourceDocument};

/// An eligible file found in the corpus directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusFile {
    pub path: PathBuf,
    /// Path relative to the corpus root, `/`-separated. Used as the
    /// fingerprint table key.
    pub relative: String,
}

/// Lists eligible files in deterministic (sorted) order.
///
/// Fails with [`ChatError::NoDocuments`] if the directory is missing or no
/// file matches.
pub fn list_files(corpus: &CorpusConfig) -> Result<Vec<CorpusFile>> {
    let root = &corpus.dir;
    if !root.is_dir() {
        return Err(ChatError::NoDocuments(root.clone()));
    }

    let include_set = build_globset(&corpus.include_globs)?;
    let exclude_set = build_globset(&corpus.exclude_globs)?;

    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| ChatError::Io {
            path: root.clone(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        if exclude_set.is_match(&relative) || !include_set.is_match(&relative) {
            continue;
        }

        files.push(CorpusFile {
            path: path.to_path_buf(),
            relative,
        });
    }

    if files.is_empty() {
        return Err(ChatError::NoDocuments(root.clone()));
    }

    files.sort_by(|a, b| a.relative.cmp(&b.relative));
    Ok(files)
}

/// Reads and extracts one file.
pub fn load_document(file: &CorpusFile) -> Result<SourceDocument> {
    let bytes = std::fs::read(&file.path).map_err(|source| ChatError::Io {
        path: file.path.clone(),
        source,
    })?;
    let content_type = content_type_for(&file.path);
    let text = extract_text(&bytes, content_type).map_err(|source| ChatError::Extract {
        path: file.path.clone(),
        source,
    })?;

    if text.is_empty() {
        warn!(path = %file.relative, "document has no extractable text");
    }

    Ok(SourceDocument {
        path: file.relative.clone(),
        text,
    })
}

/// Loads every file and chunks it, preserving file order.
pub fn load_chunks(files: &[CorpusFile], chunking: &ChunkingConfig) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for file in files {
        let doc = load_document(file)?;
        let doc_chunks = chunk_text(
            &doc.path,
            &doc.text,
            chunking.chunk_size,
            chunking.chunk_overlap,
        );
        debug!(path = %doc.path, chunks = doc_chunks.len(), "loaded document");
        chunks.extend(doc_chunks);
    }
    Ok(chunks)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern)
            .map_err(|e| ChatError::BadRequest(format!("invalid glob '{}': {}", pattern, e)))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| ChatError::BadRequest(format!("invalid glob set: {}", e)))
}
