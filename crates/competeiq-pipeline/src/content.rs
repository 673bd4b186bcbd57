//! Content fingerprinting used for deduplication.

use sha2::{Digest, Sha256};

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Hex SHA-256 over the normalized title and body.
///
/// Normalization trims, collapses internal whitespace and lowercases, so
/// cosmetic re-publishes of the same article hash identically.
#[must_use]
pub fn content_hash(title: &str, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(title).as_bytes());
    hasher.update(b"\n");
    hasher.update(normalize(body).as_bytes());
    format!("{:x}", hasher.finalize())
}
