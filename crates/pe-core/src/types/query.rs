use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// An immutable policy question, carrying a deterministic fingerprint over
/// its normalized text plus whatever context bundle it was paired with.
///
/// The fingerprint is computed the same way this workspace's agent layer
/// already hashes decision inputs for determinism verification: SHA-256 over
/// a stable concatenation of normalized fields.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PolicyQuery {
    pub text: String,
    fingerprint: String,
}

impl PolicyQuery {
    pub fn new(text: impl Into<String>, context_bundle_id: &str) -> Self {
        let text = text.into();
        let fingerprint = compute_query_fingerprint(&text, context_bundle_id);
        Self { text, fingerprint }
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// Deterministic hash of normalized query text + context bundle ID.
/// Normalization lowercases and collapses whitespace, so textually
/// equivalent queries that differ only in casing/spacing share a
/// fingerprint (required for the idempotent re-run property in spec §8).
pub fn compute_query_fingerprint(text: &str, context_bundle_id: &str) -> String {
    let normalized = normalize(text);
    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.update(b"|");
    hasher.update(context_bundle_id.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
