//! Text extraction for binary documents.
//!
//! The corpus loader supplies file bytes plus a content type; this module
//! returns plain UTF-8 text with whitespace normalized so the chunker sees
//! stable paragraph boundaries.

use thiserror::Error;

pub const MIME_PDF: &str = "application/pdf";
pub const MIME_TEXT: &str = "text/plain";

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("file is not valid UTF-8")]
    Utf8,
}

/// Guesses a content type from a file extension.
pub fn content_type_for(path: &std::path::Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("pdf") => MIME_PDF,
        Some("txt") | Some("md") => MIME_TEXT,
        _ => "application/octet-stream",
    }
}

/// Extracts and normalizes text from `bytes`.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    let raw = match content_type {
        MIME_PDF => extract_pdf(bytes)?,
        MIME_TEXT => String::from_utf8(bytes.to_vec()).map_err(|_| ExtractError::Utf8)?,
        _ => {
            return Err(ExtractError::UnsupportedContentType(
                content_type.to_string(),
            ))
        }
    };
    Ok(normalize(&raw))
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| ExtractError::Pdf(e.to_string()))
}

/// Collapses runs of spaces/tabs, strips trailing whitespace per line, and
/// squeezes three or more newlines into a single paragraph break.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0usize;

    for line in text.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            blank_run += 1;
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run > 0 { "\n\n" } else { "\n" });
        }
        out.push_str(&collapsed);
        blank_run = 0;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn unsupported_content_type_returns_error() {
        let err = extract_text(b"foo", "application/octet-stream").unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedContentType(_)));
    }

    #[test]
    fn invalid_pdf_returns_error() {
        let err = extract_text(b"not a pdf", MIME_PDF).unwrap_err();
        assert!(matches!(err, ExtractError::Pdf(_)));
    }

    #[test]
    fn plain_text_is_normalized() {
        let text = extract_text(b"Name:   Jane\t Doe  \n\n\n\nSkills: Rust\nGo", MIME_TEXT).unwrap();
        assert_eq!(text, "Name: Jane Doe\n\nSkills: Rust\nGo");
    }

    #[test]
    fn content_type_by_extension() {
        assert_eq!(content_type_for(Path::new("cv/resume.PDF")), MIME_PDF);
        assert_eq!(content_type_for(Path::new("notes.md")), MIME_TEXT);
        assert_eq!(
            content_type_for(Path::new("photo.png")),
            "application/octet-stream"
        );
    }
}
