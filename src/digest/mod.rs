// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Digest trees: a root fingerprint over a network's dataset plus optional
//! per-item leaves for fine-grained diffing.
//!
//! # Sync Protocol
//!
//! 1. Gateway sends the root digest it last saw
//! 2. If it matches the stored root, nothing to send
//! 3. Otherwise compare leaves to find the items that changed
//! 4. Transfer only those items (or page through the whole set)
//!
//! Digests are opaque strings to the store; [`hasher`] offers a SHA-256
//! builder for producers that don't bring their own.

pub mod hasher;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use hasher::{hash_bytes, DigestTreeBuilder};

/// Digest of a single item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeafDigest {
    pub id: String,
    pub digest: String,
}

impl LeafDigest {
    pub fn new(id: impl Into<String>, digest: impl Into<String>) -> Self {
        Self { id: id.into(), digest: digest.into() }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestTree {
    pub root_digest: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub leaf_digests: Vec<LeafDigest>,
}

/// Result of comparing two digest trees leaf by leaf.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeafDiff {
    /// Present on both sides with different digests, or only in `self`
    pub changed: Vec<String>,
    /// Present only in the other tree
    pub removed: Vec<String>,
}

impl LeafDiff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.removed.is_empty()
    }
}

impl DigestTree {
    pub fn new(root_digest: impl Into<String>, leaf_digests: Vec<LeafDigest>) -> Self {
        Self { root_digest: root_digest.into(), leaf_digests }
    }

    /// Root-only tree.
    pub fn root_only(root_digest: impl Into<String>) -> Self {
        Self::new(root_digest, Vec::new())
    }

    /// Same root, no leaves.
    pub fn without_leaves(mut self) -> Self {
        self.leaf_digests.clear();
        self
    }

    pub fn leaf(&self, id: &str) -> Option<&str> {
        self.leaf_digests
            .iter()
            .find(|l| l.id == id)
            .map(|l| l.digest.as_str())
    }

    /// Compare against `theirs` (typically the client's last-known tree).
    ///
    /// Ids come back sorted.
    pub fn diff_leaves(&self, theirs: &DigestTree) -> LeafDiff {
        let ours: BTreeMap<&str, &str> = self
            .leaf_digests
            .iter()
            .map(|l| (l.id.as_str(), l.digest.as_str()))
            .collect();
        let their_map: BTreeMap<&str, &str> = theirs
            .leaf_digests
            .iter()
            .map(|l| (l.id.as_str(), l.digest.as_str()))
            .collect();

        let mut diff = LeafDiff::default();
        for (id, digest) in &ours {
            match their_map.get(id) {
                Some(their_digest) if their_digest == digest => {}
                _ => diff.changed.push(id.to_string()),
            }
        }
        for id in their_map.keys() {
            if !ours.contains_key(id) {
                diff.removed.push(id.to_string());
            }
        }
        diff
    }
}
