//! Error taxonomy shared by the indexing and query paths.
//!
//! Startup conditions ([`ChatError::NoDocuments`], [`ChatError::IndexNotFound`])
//! are fatal: the server refuses to start. Everything else is scoped to a single
//! request and surfaces to the caller without retry.

use std::path::PathBuf;

use thiserror::Error;

use crate::extract::ExtractError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no documents found in {}", .0.display())]
    NoDocuments(PathBuf),

    #[error("vector index not found at {}; load documents at least once to build it", .0.display())]
    IndexNotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to extract {}: {source}", path.display())]
    Extract {
        path: PathBuf,
        #[source]
        source: ExtractError,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("embedding provider failed: {0}")]
    Embedding(String),

    #[error("llm provider failed: {0}")]
    Llm(String),

    #[error("index storage failed: {0}")]
    Index(String),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("processing failed: {0}")]
    Processing(String),
}

impl ChatError {
    /// Whether this error should abort startup rather than fail one request.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChatError::NoDocuments(_) | ChatError::IndexNotFound(_))
    }

    /// Collapses a per-request failure into the generic processing error the
    /// transport reports. Validation errors pass through untouched.
    pub fn into_processing(self) -> ChatError {
        match self {
            ChatError::BadRequest(_) | ChatError::Processing(_) => self,
            other => ChatError::Processing(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for ChatError {
    fn from(err: sqlx::Error) -> Self {
        ChatError::Index(err.to_string())
    }
}

pub type Result<T, E = ChatError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn startup_errors_are_fatal() {
        assert!(ChatError::NoDocuments(PathBuf::from("app/data")).is_fatal());
        assert!(ChatError::IndexNotFound(PathBuf::from("idx")).is_fatal());
        assert!(!ChatError::Llm("boom".into()).is_fatal());
    }

    #[test]
    fn into_processing_keeps_the_cause() {
        let err = ChatError::Embedding("429 too many requests".into()).into_processing();
        match err {
            ChatError::Processing(msg) => assert!(msg.contains("429")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            ChatError::BadRequest("empty".into()).into_processing(),
            ChatError::BadRequest(_)
        ));
    }
}
