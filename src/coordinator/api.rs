// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Delegating operations of the façade and its [`SyncStoreReader`] impl.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};

use crate::clock::Clock;
use crate::digest::DigestTree;
use crate::storage::traits::{StorageError, SyncStoreReader};
use crate::storage::{CacheWriter, DigestRecord, GcReport};

use super::SyncStore;

impl SyncStore {
    // ═══════════════════════════════════════════════════════════════════════════
    // Digests
    // ═══════════════════════════════════════════════════════════════════════════

    /// Create or overwrite `network`'s digest, stamped with the current time.
    ///
    /// Call only after the matching cache writer applied.
    pub async fn set_digest(&self, network: &str, tree: &DigestTree) -> Result<(), StorageError> {
        self.digests.set_digest(network, tree).await
    }

    /// See [`SyncStoreReader::get_digests`].
    pub async fn get_digests(
        &self,
        networks: &[String],
        cutoff: i64,
        include_leaves: bool,
    ) -> Result<BTreeMap<String, DigestTree>, StorageError> {
        self.digests.get_digests(networks, cutoff, include_leaves).await
    }

    pub async fn get_digest(&self, network: &str) -> Result<Option<DigestRecord>, StorageError> {
        self.digests.get_digest(network).await
    }

    pub async fn tracked_networks(&self) -> Result<Vec<String>, StorageError> {
        self.digests.tracked_networks().await
    }

    /// Networks whose digest is older than `now - update_interval_secs`.
    pub async fn outdated_networks(&self, update_interval_secs: i64) -> Result<Vec<String>, StorageError> {
        let deadline = self.ctx.clock.now_secs() - update_interval_secs;
        self.digests.outdated_networks(deadline).await
    }

    pub async fn delete_digests(&self, networks: &[String]) -> Result<u64, StorageError> {
        self.digests.delete_digests(networks).await
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Cache
    // ═══════════════════════════════════════════════════════════════════════════

    /// Begin rebuilding `network`'s cache. See [`CacheWriter`].
    pub fn update_cache(&self, network: &str) -> CacheWriter {
        self.cache.update_cache(network)
    }

    pub async fn get_cached_by_id(&self, network: &str, ids: &[String]) -> Result<Vec<Vec<u8>>, StorageError> {
        self.cache.get_cached_by_id(network, ids).await
    }

    pub async fn get_cached_by_page(
        &self,
        network: &str,
        page_token: &str,
        page_size: u32,
    ) -> Result<(Vec<Vec<u8>>, String), StorageError> {
        self.cache.get_cached_by_page(network, page_token, page_size).await
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Garbage collection
    // ═══════════════════════════════════════════════════════════════════════════

    /// Remove all stored state of networks not in `live_networks`.
    pub async fn collect_garbage(&self, live_networks: &[String]) -> Result<GcReport, StorageError> {
        let keep: BTreeSet<String> = live_networks.iter().cloned().collect();
        self.gc.collect_garbage(&keep).await
    }
}

#[async_trait]
impl SyncStoreReader for SyncStore {
    async fn get_digests(
        &self,
        networks: &[String],
        cutoff: i64,
        include_leaves: bool,
    ) -> Result<BTreeMap<String, DigestTree>, StorageError> {
        self.digests.get_digests(networks, cutoff, include_leaves).await
    }

    async fn get_cached_by_id(&self, network: &str, ids: &[String]) -> Result<Vec<Vec<u8>>, StorageError> {
        self.cache.get_cached_by_id(network, ids).await
    }

    async fn get_cached_by_page(
        &self,
        network: &str,
        page_token: &str,
        page_size: u32,
    ) -> Result<(Vec<Vec<u8>>, String), StorageError> {
        self.cache.get_cached_by_page(network, page_token, page_size).await
    }
}
