/// Text normalization and hashing used by fingerprinting and persistence.
use sha2::{Digest, Sha256};

/// Collapse all runs of whitespace to a single space and trim the ends.
///
/// Two documents that differ only in whitespace normalize to the same
/// string, which is what keeps fingerprints stable across re-ingests of
/// the same body text with different line wrapping.
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_gap = true;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_gap {
                out.push(' ');
                in_gap = true;
            }
        } else {
            out.push(ch);
            in_gap = false;
        }
    }
    while out.ends_with(' ') {
        out.pop();
    }
    out
}

/// SHA-256 of the whitespace-normalized content, hex encoded.
///
/// Absent or whitespace-only content hashes to the empty-content sentinel
/// (the digest of the empty string), so "no body yet" is one stable value.
#[must_use]
pub fn content_hash(content: &str) -> String {
    let normalized = normalize_whitespace(content);
    hex_digest(normalized.as_bytes())
}

/// Normalize a case number for fingerprinting: lowercase, keep only
/// alphanumerics, `:` and `-`. `2:22-CV-00001` and `2:22-cv-00001 ` agree.
#[must_use]
pub fn normalize_case_number(case_number: &str) -> String {
    case_number
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ':' || *c == '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Hex-encoded SHA-256 digest of raw bytes.
#[must_use]
pub fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}
