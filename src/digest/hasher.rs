// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Deterministic SHA-256 digest trees.
//!
//! Leaves are sorted by id before hashing, so the same content yields the same
//! tree regardless of the order a producer loaded it in.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use super::{DigestTree, LeafDigest};

/// Hex SHA-256 of `bytes`.
pub fn hash_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Accumulates `(id, bytes)` pairs and hashes them into a [`DigestTree`].
#[derive(Debug, Default)]
pub struct DigestTreeBuilder {
    leaves: BTreeMap<String, String>,
}

impl DigestTreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an item. Re-adding an id replaces its earlier content.
    pub fn leaf(&mut self, id: impl Into<String>, bytes: &[u8]) -> &mut Self {
        let id = id.into();
        let digest = Self::leaf_hash(&id, bytes);
        self.leaves.insert(id, digest);
        self
    }

    /// Add an item whose digest was computed elsewhere.
    pub fn leaf_digest(&mut self, id: impl Into<String>, digest: impl Into<String>) -> &mut Self {
        self.leaves.insert(id.into(), digest.into());
        self
    }

    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Hash = SHA256(id || 0x00 || bytes)
    pub fn leaf_hash(id: &str, bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(id.as_bytes());
        hasher.update([0u8]);
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    pub fn build(&self) -> DigestTree {
        let mut hasher = Sha256::new();
        // BTreeMap is already sorted by id
        for (id, digest) in &self.leaves {
            hasher.update(id.as_bytes());
            hasher.update(b":");
            hasher.update(digest.as_bytes());
            hasher.update(b";");
        }
        let root_digest = hex::encode(hasher.finalize());
        let leaf_digests = self
            .leaves
            .iter()
            .map(|(id, digest)| LeafDigest::new(id.clone(), digest.clone()))
            .collect();
        DigestTree { root_digest, leaf_digests }
    }
}

impl<K: Into<String>, V: AsRef<[u8]>> FromIterator<(K, V)> for DigestTreeBuilder {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut builder = Self::new();
        for (id, bytes) in iter {
            builder.leaf(id, bytes.as_ref());
        }
        builder
    }
}
