//! Content fingerprinting for duplicate detection
//!
//! An asset's fingerprint is the lowercase-hex SHA-256 digest of its bytes.
//! Two files in the same import batch with the same fingerprint are
//! byte-identical duplicates. Perceptual (similarity-tolerant) hashes are
//! carried through the pipeline when supplied by the caller but are never
//! computed here; image decoding is out of scope for this crate.

use crate::error::{MediastageError, Result};
use sha2::{Digest, Sha256};
use std::io::Read;

/// Compute the content fingerprint of an in-memory buffer.
pub fn content_fingerprint(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Compute the content fingerprint of any readable source.
pub fn fingerprint_reader<R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Verify that a buffer matches an expected fingerprint.
pub fn verify_fingerprint(data: &[u8], expected: &str) -> Result<()> {
    let actual = content_fingerprint(data);
    if actual == expected {
        Ok(())
    } else {
        Err(MediastageError::FingerprintMismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}
