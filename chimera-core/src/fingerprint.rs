//! Content fingerprints for generation requests.
//!
//! A fingerprint is a SHA-256 digest over the semantically relevant fields of
//! a request. Fields are written with length prefixes so that no two distinct
//! field sequences can produce the same byte stream, and the stream starts
//! with a version tag so the derivation can evolve without silently colliding
//! with older rows.

use crate::artifact::ArtifactKind;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Version tag mixed into every fingerprint.
pub const FINGERPRINT_VERSION: &str = "chimera.fp.v1";

/// Stable identity of a logical generation request (hex-encoded SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Wrap a fingerprint read back from storage.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 16 hex characters, for log lines and blob keys.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(16)]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fingerprint {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Incremental builder writing named, length-prefixed fields into the digest.
pub struct FingerprintBuilder {
    hasher: Sha256,
}

impl FingerprintBuilder {
    pub fn new(kind: ArtifactKind) -> Self {
        let builder = Self {
            hasher: Sha256::new(),
        };
        builder
            .field("version", FINGERPRINT_VERSION)
            .field("kind", kind.as_db_str())
    }

    pub fn field(mut self, name: &str, value: &str) -> Self {
        for part in [name, value] {
            self.hasher.update((part.len() as u64).to_be_bytes());
            self.hasher.update(part.as_bytes());
        }
        self
    }

    pub fn finish(self) -> Fingerprint {
        Fingerprint(hex::encode(self.hasher.finalize()))
    }
}

/// Trim and collapse internal whitespace runs to a single space.
pub fn normalize_prompt(prompt: &str) -> String {
    prompt.split_whitespace().collect::<Vec<_>>().join(" ")
}
