//! Core data types that flow between the corpus loader, the index, and the
//! conversation log.

use serde::{Deserialize, Serialize};

/// A source file after text extraction.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    /// Path relative to the corpus directory, `/`-separated.
    pub path: String,
    pub text: String,
}

/// A bounded span of a document's text, the unit of retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Relative path of the document this chunk came from.
    pub source: String,
    pub chunk_index: i64,
    pub text: String,
}

/// One question/answer pair from a session's rolling history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub question: String,
    pub answer: String,
}

impl Exchange {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}
