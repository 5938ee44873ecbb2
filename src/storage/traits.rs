// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::digest::DigestTree;

/// Why a cache writer was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidWriterReason {
    /// The writer already reached its terminal apply.
    AlreadyUsed,
    /// A writer with the same or a newer generation committed first.
    Superseded,
    /// The writer outlived `cache_writer_valid_interval_secs`.
    Expired,
}

impl InvalidWriterReason {
    /// Short label for metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlreadyUsed => "already_used",
            Self::Superseded => "superseded",
            Self::Expired => "expired",
        }
    }
}

impl fmt::Display for InvalidWriterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyUsed => write!(f, "already applied"),
            Self::Superseded => write!(f, "superseded by a newer generation"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{op} failed for network '{network}': {source}")]
    Backend {
        op: &'static str,
        network: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("attempt to {action} network {network} with invalid cache writer ({reason})")]
    InvalidWriter {
        action: &'static str,
        network: String,
        reason: InvalidWriterReason,
    },
    #[error("invalid page token: {0}")]
    InvalidPageToken(String),
    #[error("corrupt digest tree stored for network '{network}': {reason}")]
    Corruption {
        network: String,
        reason: String,
    },
    #[error("storage connection failed: {0}")]
    Connection(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl StorageError {
    /// True when a cache writer lost the generation race or expired.
    ///
    /// This is the expected outcome of overlapping builds: drop the writer and
    /// try again on the next cycle.
    pub fn is_invalid_writer(&self) -> bool {
        matches!(self, Self::InvalidWriter { .. })
    }
}

/// Builds a `map_err` adapter that annotates a sqlx error with context.
pub(crate) fn backend(op: &'static str, network: &str) -> impl FnOnce(sqlx::Error) -> StorageError {
    let network = network.to_string();
    move |source| StorageError::Backend { op, network, source }
}

/// Read side of the sync store, as used by gateway-facing handlers.
#[async_trait]
pub trait SyncStoreReader: Send + Sync {
    /// Digest trees of `networks` (all tracked networks when empty) whose
    /// last update is at or before `cutoff` (unix seconds).
    async fn get_digests(
        &self,
        networks: &[String],
        cutoff: i64,
        include_leaves: bool,
    ) -> Result<BTreeMap<String, DigestTree>, StorageError>;

    /// Cached blobs for `ids`, in input order, skipping unknown ids.
    async fn get_cached_by_id(&self, network: &str, ids: &[String]) -> Result<Vec<Vec<u8>>, StorageError>;

    /// One page of cached blobs in ascending id order plus the next token
    /// (empty once the set is exhausted).
    async fn get_cached_by_page(
        &self,
        network: &str,
        page_token: &str,
        page_size: u32,
    ) -> Result<(Vec<Vec<u8>>, String), StorageError>;
}
