//! Definition normalization
//!
//! Two definitions are considered equal when they match line by line after
//! trimming surrounding whitespace. Case is significant.

use sha2::{Digest, Sha256};

/// Trim every line and rejoin with `\n`
pub fn normalize_definition(text: &str) -> String {
    text.split('\n')
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn definitions_equal(left: &str, right: &str) -> bool {
    normalize_definition(left) == normalize_definition(right)
}

/// Hex SHA-256 of the normalized definition
pub fn definition_fingerprint(text: &str) -> String {
    let digest = Sha256::digest(normalize_definition(text).as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}
