//! Content fingerprints for change detection.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

/// File path → SHA-256 hex digest, as persisted under the fingerprint key.
pub type FingerprintTable = BTreeMap<String, String>;

/// SHA-256 of `bytes` as 64 lowercase hex characters.
pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Fingerprints a file's full contents. Read errors propagate unchanged.
pub fn fingerprint_file(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(fingerprint(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_bytes_same_digest() {
        let a = fingerprint(b"Senior backend engineer, 7 years");
        let b = fingerprint(b"Senior backend engineer, 7 years");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn one_byte_changes_digest() {
        let a = fingerprint(b"resume v1");
        let b = fingerprint(b"resume v2");
        assert_ne!(a, b);
    }

    #[test]
    fn known_vector() {
        assert_eq!(
            fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = fingerprint_file(&tmp.path().join("nope.pdf")).unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
