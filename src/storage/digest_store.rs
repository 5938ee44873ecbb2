// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable `network → digest tree` map.
//!
//! Writes are unconditional last-write-wins upserts stamped with the clock.
//! Reads filter on `last_updated_unix_seconds <= cutoff`: passing "now"
//! returns everything, passing `now - interval` returns outdated digests.

use sqlx::Row;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use super::sql::{placeholders, read_text, SqlContext};
use super::traits::{backend, StorageError};
use crate::clock::Clock;
use crate::digest::DigestTree;
use crate::metrics::{self, LatencyTimer};

/// IN-clause chunk size
const CHUNK_SIZE: usize = 500;

/// One persisted digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestRecord {
    pub network: String,
    pub tree: DigestTree,
    pub last_updated_unix_seconds: i64,
}

#[derive(Clone)]
pub struct DigestStore {
    ctx: SqlContext,
}

impl DigestStore {
    pub(crate) fn new(ctx: SqlContext) -> Self {
        Self { ctx }
    }

    /// Create or overwrite the digest for `network`, stamped with the current time.
    #[instrument(skip(self, tree), fields(network = %network))]
    pub async fn set_digest(&self, network: &str, tree: &DigestTree) -> Result<(), StorageError> {
        let _timer = LatencyTimer::new("set_digest");
        metrics::observe("set_digest", self.upsert(network, tree).await)
    }

    async fn upsert(&self, network: &str, tree: &DigestTree) -> Result<(), StorageError> {
        let encoded = serde_json::to_string(tree).map_err(|e| StorageError::Corruption {
            network: network.to_string(),
            reason: e.to_string(),
        })?;
        let now = self.ctx.clock.now_secs();
        let table = &self.ctx.tables.digests;

        let sql = if self.ctx.is_sqlite {
            format!(
                "INSERT INTO {} (network, encoded_digest_tree, last_updated_unix_seconds)
                 VALUES (?, ?, ?)
                 ON CONFLICT(network) DO UPDATE SET
                    encoded_digest_tree = excluded.encoded_digest_tree,
                    last_updated_unix_seconds = excluded.last_updated_unix_seconds",
                table
            )
        } else {
            format!(
                "INSERT INTO {} (network, encoded_digest_tree, last_updated_unix_seconds)
                 VALUES (?, ?, ?)
                 ON DUPLICATE KEY UPDATE
                    encoded_digest_tree = VALUES(encoded_digest_tree),
                    last_updated_unix_seconds = VALUES(last_updated_unix_seconds)",
                table
            )
        };

        let mut tx = self.ctx.pool.begin().await.map_err(backend("set_digest", network))?;
        sqlx::query(&sql)
            .bind(network)
            .bind(&encoded)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(backend("set_digest", network))?;
        tx.commit().await.map_err(backend("set_digest", network))?;

        debug!(updated_at = now, leaves = tree.leaf_digests.len(), "Digest stored");
        Ok(())
    }

    /// Digest trees for `networks` (all tracked networks when empty) last
    /// updated at or before `cutoff`. Networks that are unknown or fail the
    /// filter are simply absent.
    #[instrument(skip(self, networks), fields(requested = networks.len()))]
    pub async fn get_digests(
        &self,
        networks: &[String],
        cutoff: i64,
        include_leaves: bool,
    ) -> Result<BTreeMap<String, DigestTree>, StorageError> {
        let _timer = LatencyTimer::new("get_digests");
        let records = metrics::observe("get_digests", self.fetch_records(networks, cutoff).await)?;

        Ok(records
            .into_iter()
            .map(|r| {
                let tree = if include_leaves { r.tree } else { r.tree.without_leaves() };
                (r.network, tree)
            })
            .collect())
    }

    /// The stored record for one network, regardless of age.
    pub async fn get_digest(&self, network: &str) -> Result<Option<DigestRecord>, StorageError> {
        let mut records = self.fetch_records(&[network.to_string()], i64::MAX).await?;
        Ok(records.pop())
    }

    /// Every network that currently has a digest, sorted.
    pub async fn tracked_networks(&self) -> Result<Vec<String>, StorageError> {
        self.outdated_networks(i64::MAX).await
    }

    /// Networks whose digest was last written at or before `deadline`, sorted.
    pub async fn outdated_networks(&self, deadline: i64) -> Result<Vec<String>, StorageError> {
        let sql = format!(
            "SELECT network FROM {} WHERE last_updated_unix_seconds <= ? ORDER BY network",
            self.ctx.tables.digests
        );
        let rows = sqlx::query(&sql)
            .bind(deadline)
            .fetch_all(&self.ctx.pool)
            .await
            .map_err(backend("outdated_networks", "*"))?;

        rows.iter()
            .map(|row| read_text(row, "network").map_err(backend("outdated_networks", "*")))
            .collect()
    }

    /// Remove the digests of `networks`. Returns rows deleted.
    pub async fn delete_digests(&self, networks: &[String]) -> Result<u64, StorageError> {
        let mut deleted = 0;
        for chunk in networks.chunks(CHUNK_SIZE) {
            let sql = format!(
                "DELETE FROM {} WHERE network IN ({})",
                self.ctx.tables.digests,
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql);
            for network in chunk {
                query = query.bind(network);
            }
            let result = query
                .execute(&self.ctx.pool)
                .await
                .map_err(backend("delete_digests", &chunk.join(",")))?;
            deleted += result.rows_affected();
        }
        Ok(deleted)
    }

    async fn fetch_records(&self, networks: &[String], cutoff: i64) -> Result<Vec<DigestRecord>, StorageError> {
        let table = &self.ctx.tables.digests;
        let mut rows = Vec::new();

        if networks.is_empty() {
            let sql = format!(
                "SELECT network, encoded_digest_tree, last_updated_unix_seconds FROM {}
                 WHERE last_updated_unix_seconds <= ? ORDER BY network",
                table
            );
            rows = sqlx::query(&sql)
                .bind(cutoff)
                .fetch_all(&self.ctx.pool)
                .await
                .map_err(backend("get_digests", "*"))?;
        } else {
            for chunk in networks.chunks(CHUNK_SIZE) {
                let sql = format!(
                    "SELECT network, encoded_digest_tree, last_updated_unix_seconds FROM {}
                     WHERE last_updated_unix_seconds <= ? AND network IN ({}) ORDER BY network",
                    table,
                    placeholders(chunk.len())
                );
                let mut query = sqlx::query(&sql).bind(cutoff);
                for network in chunk {
                    query = query.bind(network);
                }
                let chunk_rows = query
                    .fetch_all(&self.ctx.pool)
                    .await
                    .map_err(backend("get_digests", &chunk.join(",")))?;
                rows.extend(chunk_rows);
            }
        }

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let network = read_text(&row, "network").map_err(backend("get_digests", "*"))?;
            let encoded = read_text(&row, "encoded_digest_tree").map_err(backend("get_digests", &network))?;
            let last_updated_unix_seconds: i64 = row
                .try_get("last_updated_unix_seconds")
                .map_err(backend("get_digests", &network))?;
            let tree: DigestTree = serde_json::from_str(&encoded).map_err(|e| StorageError::Corruption {
                network: network.clone(),
                reason: e.to_string(),
            })?;
            records.push(DigestRecord { network, tree, last_updated_unix_seconds });
        }
        Ok(records)
    }
}
