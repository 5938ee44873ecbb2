// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Gateway-facing read path.
//!
//! A gateway keeps the root digest it last synced. On the first page of a
//! listing the stored root is compared against it:
//!
//! ```text
//! client root == stored root  → no_updates, empty page
//! otherwise                   → page of the cached set + stored root
//! ```
//!
//! Later pages are served straight from the cache and echo the client's root.
//! A network without a digest yet is served without the check.

use std::sync::Arc;
use tracing::{debug, instrument};

use crate::digest::DigestTree;
use crate::metrics;
use crate::storage::traits::{StorageError, SyncStoreReader};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    pub page_token: String,
    /// 0 means the store's maximum page size.
    pub page_size: u32,
    pub client_root_digest: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListResponse {
    pub objects: Vec<Vec<u8>>,
    pub next_page_token: String,
    pub root_digest: Option<String>,
    pub no_updates: bool,
}

/// Objects a client must fetch to catch up from its leaf digests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    pub root_digest: String,
    pub changed_ids: Vec<String>,
    /// Blobs of `changed_ids` still present in the cache, same order.
    pub changed: Vec<Vec<u8>>,
    pub removed_ids: Vec<String>,
}

pub struct GatewaySync<R: SyncStoreReader + ?Sized> {
    reader: Arc<R>,
}

impl<R: SyncStoreReader + ?Sized> Clone for GatewaySync<R> {
    fn clone(&self) -> Self {
        Self {
            reader: self.reader.clone(),
        }
    }
}

impl<R: SyncStoreReader + ?Sized> GatewaySync<R> {
    pub fn new(reader: Arc<R>) -> Self {
        Self { reader }
    }

    /// Current digest tree of `network` regardless of age.
    async fn current(&self, network: &str, include_leaves: bool) -> Result<Option<DigestTree>, StorageError> {
        let mut digests = self
            .reader
            .get_digests(&[network.to_string()], i64::MAX, include_leaves)
            .await?;
        Ok(digests.remove(network))
    }

    #[instrument(skip(self, request), fields(network = %network, first_page = request.page_token.is_empty()))]
    pub async fn list(&self, network: &str, request: &ListRequest) -> Result<ListResponse, StorageError> {
        let mut root_digest = request.client_root_digest.clone();

        if request.page_token.is_empty() {
            if let Some(current) = self.current(network, false).await? {
                if request.client_root_digest.as_deref() == Some(current.root_digest.as_str()) {
                    metrics::record_gateway_no_updates();
                    debug!("Client is up to date");
                    return Ok(ListResponse {
                        root_digest: Some(current.root_digest),
                        no_updates: true,
                        ..Default::default()
                    });
                }
                root_digest = Some(current.root_digest);
            }
        }

        let (objects, next_page_token) = self
            .reader
            .get_cached_by_page(network, &request.page_token, request.page_size)
            .await?;
        Ok(ListResponse {
            objects,
            next_page_token,
            root_digest,
            no_updates: false,
        })
    }

    /// Leaf-level catch-up against the client's last tree. Empty when the
    /// network has no digest.
    #[instrument(skip(self, client_tree), fields(network = %network))]
    pub async fn changes(&self, network: &str, client_tree: &DigestTree) -> Result<ChangeSet, StorageError> {
        let Some(current) = self.current(network, true).await? else {
            return Ok(ChangeSet::default());
        };
        if current.root_digest == client_tree.root_digest {
            return Ok(ChangeSet {
                root_digest: current.root_digest,
                ..Default::default()
            });
        }

        let diff = current.diff_leaves(client_tree);
        let changed = if diff.changed.is_empty() {
            Vec::new()
        } else {
            self.reader.get_cached_by_id(network, &diff.changed).await?
        };
        debug!(changed = diff.changed.len(), removed = diff.removed.len(), "Computed change set");

        Ok(ChangeSet {
            root_digest: current.root_digest,
            changed_ids: diff.changed,
            changed,
            removed_ids: diff.removed,
        })
    }
}
