// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable `network → object set` cache, rebuilt wholesale by cache writers.
//!
//! # Build protocol
//!
//! ```text
//! update_cache(n) ──► CacheWriter { generation = now_ms, writer_id }
//!        │
//!        ├── insert_many(chunk) ──► <prefix>_cache_staging   (invisible)
//!        ├── insert_many(chunk) ──► ...
//!        │
//!        └── apply() ── one transaction ──────────────────────────────┐
//!              1. age = now - generation > valid interval → Expired     │
//!              2. committed generation >= mine            → Superseded  │
//!              3. replace cache_objects(n) with staged rows             │
//!              4. record generation, drop staging                       │
//!            ◄─────────────────────────────────────────────────────────┘
//! ```
//!
//! Overlapping builds are arbitrated purely by step 2: the committed data
//! always comes from the most recently *started* build that managed to apply,
//! so a slow, stale worker can never clobber a fresher one.

use sqlx::Row;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, instrument, warn};

use super::page_token::PageToken;
use super::sql::{placeholders, read_text, SqlContext};
use super::traits::{backend, InvalidWriterReason, StorageError};
use crate::clock::Clock;
use crate::config::SyncStoreConfig;
use crate::metrics::{self, LatencyTimer};

/// IN-clause chunk size for id lookups
const ID_CHUNK_SIZE: usize = 500;

#[derive(Clone)]
pub struct CacheStore {
    ctx: SqlContext,
    valid_interval_secs: i64,
    max_page_size: u32,
    insert_chunk_size: usize,
}

impl CacheStore {
    pub(crate) fn new(ctx: SqlContext, config: &SyncStoreConfig) -> Self {
        Self {
            ctx,
            valid_interval_secs: config.cache_writer_valid_interval_secs,
            max_page_size: config.max_page_size,
            insert_chunk_size: config.insert_chunk_size,
        }
    }

    /// Begin a new build generation for `network`. Committed rows are untouched
    /// until the returned writer applies.
    #[instrument(skip(self), fields(network = %network))]
    pub fn update_cache(&self, network: &str) -> CacheWriter {
        let writer = CacheWriter {
            ctx: self.ctx.clone(),
            network: network.to_string(),
            writer_id: uuid::Uuid::new_v4().simple().to_string(),
            generation: self.ctx.clock.now_millis(),
            valid_interval_secs: self.valid_interval_secs,
            insert_chunk_size: self.insert_chunk_size,
            staged: 0,
            invalidated: false,
        };
        debug!(writer_id = %writer.writer_id, generation = writer.generation, "Cache writer opened");
        writer
    }

    /// Blobs for `ids` in caller order; unknown ids are skipped.
    #[instrument(skip(self, ids), fields(network = %network, requested = ids.len()))]
    pub async fn get_cached_by_id(&self, network: &str, ids: &[String]) -> Result<Vec<Vec<u8>>, StorageError> {
        let _timer = LatencyTimer::new("get_cached_by_id");
        metrics::observe("get_cached_by_id", self.fetch_by_id(network, ids).await)
    }

    async fn fetch_by_id(&self, network: &str, ids: &[String]) -> Result<Vec<Vec<u8>>, StorageError> {
        let mut found: HashMap<String, Vec<u8>> = HashMap::with_capacity(ids.len());

        for chunk in ids.chunks(ID_CHUNK_SIZE) {
            let sql = format!(
                "SELECT id, obj FROM {} WHERE network = ? AND id IN ({})",
                self.ctx.tables.cache_objects,
                placeholders(chunk.len())
            );
            let mut query = sqlx::query(&sql).bind(network);
            for id in chunk {
                query = query.bind(id);
            }
            let rows = query
                .fetch_all(&self.ctx.pool)
                .await
                .map_err(backend("get_cached_by_id", network))?;

            for row in rows {
                let id = read_text(&row, "id").map_err(backend("get_cached_by_id", network))?;
                let obj: Vec<u8> = row.try_get("obj").map_err(backend("get_cached_by_id", network))?;
                found.insert(id, obj);
            }
        }

        Ok(ids.iter().filter_map(|id| found.get(id).cloned()).collect())
    }

    /// Up to `page_size` blobs in ascending id order, strictly after the id in
    /// `page_token`. A full page returns a token for its last id; a short page
    /// returns the empty token. `page_size` 0 (or above the configured maximum)
    /// means the maximum.
    #[instrument(skip(self, page_token), fields(network = %network, page_size))]
    pub async fn get_cached_by_page(
        &self,
        network: &str,
        page_token: &str,
        page_size: u32,
    ) -> Result<(Vec<Vec<u8>>, String), StorageError> {
        let _timer = LatencyTimer::new("get_cached_by_page");
        metrics::observe("get_cached_by_page", self.fetch_page(network, page_token, page_size).await)
    }

    async fn fetch_page(
        &self,
        network: &str,
        page_token: &str,
        page_size: u32,
    ) -> Result<(Vec<Vec<u8>>, String), StorageError> {
        let limit = if page_size == 0 || page_size > self.max_page_size {
            self.max_page_size
        } else {
            page_size
        };
        let after = PageToken::decode(page_token)?;
        let table = &self.ctx.tables.cache_objects;

        let rows = match &after {
            Some(token) => {
                let sql = format!(
                    "SELECT id, obj FROM {} WHERE network = ? AND id > ? ORDER BY id LIMIT ?",
                    table
                );
                sqlx::query(&sql)
                    .bind(network)
                    .bind(&token.last_included_id)
                    .bind(limit as i64)
                    .fetch_all(&self.ctx.pool)
                    .await
            }
            None => {
                let sql = format!("SELECT id, obj FROM {} WHERE network = ? ORDER BY id LIMIT ?", table);
                sqlx::query(&sql)
                    .bind(network)
                    .bind(limit as i64)
                    .fetch_all(&self.ctx.pool)
                    .await
            }
        }
        .map_err(backend("get_cached_by_page", network))?;

        let mut objects = Vec::with_capacity(rows.len());
        let mut last_id = None;
        for row in &rows {
            last_id = Some(read_text(row, "id").map_err(backend("get_cached_by_page", network))?);
            objects.push(row.try_get::<Vec<u8>, _>("obj").map_err(backend("get_cached_by_page", network))?);
        }

        let next_token = match last_id {
            Some(id) if objects.len() == limit as usize => PageToken::after(id).encode(),
            _ => String::new(),
        };
        Ok((objects, next_token))
    }

    /// Number of committed objects for `network`.
    pub async fn count_cached(&self, network: &str) -> Result<u64, StorageError> {
        let sql = format!("SELECT COUNT(*) AS cnt FROM {} WHERE network = ?", self.ctx.tables.cache_objects);
        let row = sqlx::query(&sql)
            .bind(network)
            .fetch_one(&self.ctx.pool)
            .await
            .map_err(backend("count_cached", network))?;
        let count: i64 = row.try_get("cnt").map_err(backend("count_cached", network))?;
        Ok(count as u64)
    }
}

/// A single-use bulk loader for one network's cache.
///
/// Stamped with its generation (creation time, unix millis). Dies after its
/// one terminal [`apply`](CacheWriter::apply), successful or not; every later
/// call fails with [`StorageError::InvalidWriter`].
pub struct CacheWriter {
    ctx: SqlContext,
    network: String,
    writer_id: String,
    generation: i64,
    valid_interval_secs: i64,
    insert_chunk_size: usize,
    staged: usize,
    invalidated: bool,
}

impl std::fmt::Debug for CacheWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheWriter")
            .field("network", &self.network)
            .field("writer_id", &self.writer_id)
            .field("generation", &self.generation)
            .field("staged", &self.staged)
            .field("invalidated", &self.invalidated)
            .finish()
    }
}

impl CacheWriter {
    pub fn network(&self) -> &str {
        &self.network
    }

    pub fn generation(&self) -> i64 {
        self.generation
    }

    /// False once the writer has applied (or failed to).
    pub fn is_valid(&self) -> bool {
        !self.invalidated
    }

    fn invalid(&self, action: &'static str, reason: InvalidWriterReason) -> StorageError {
        metrics::record_writer_rejected(reason.as_str());
        StorageError::InvalidWriter {
            action,
            network: self.network.clone(),
            reason,
        }
    }

    /// Stage objects. Can be called repeatedly to stream a large dataset;
    /// each call is its own transaction. Re-staging an id replaces it.
    #[instrument(skip(self, items), fields(network = %self.network, count = items.len()))]
    pub async fn insert_many(&mut self, items: &BTreeMap<String, Vec<u8>>) -> Result<(), StorageError> {
        if self.invalidated {
            return Err(self.invalid("insert into", InvalidWriterReason::AlreadyUsed));
        }
        if items.is_empty() {
            return Ok(());
        }
        let _timer = LatencyTimer::new("insert_many");
        let result = self.stage(items).await;
        if result.is_ok() {
            self.staged += items.len();
            metrics::record_objects_staged(items.len());
        }
        metrics::observe("insert_many", result)
    }

    async fn stage(&self, items: &BTreeMap<String, Vec<u8>>) -> Result<(), StorageError> {
        let table = &self.ctx.tables.cache_staging;
        let rows: Vec<(&String, &Vec<u8>)> = items.iter().collect();

        let mut tx = self.ctx.pool.begin().await.map_err(backend("insert_many", &self.network))?;
        for chunk in rows.chunks(self.insert_chunk_size) {
            let values = vec!["(?, ?, ?, ?, ?)"; chunk.len()].join(", ");
            let sql = if self.ctx.is_sqlite {
                format!(
                    "INSERT INTO {} (writer_id, id, network, generation, obj) VALUES {}
                     ON CONFLICT(writer_id, id) DO UPDATE SET obj = excluded.obj",
                    table, values
                )
            } else {
                format!(
                    "INSERT INTO {} (writer_id, id, network, generation, obj) VALUES {}
                     ON DUPLICATE KEY UPDATE obj = VALUES(obj)",
                    table, values
                )
            };

            let mut query = sqlx::query(&sql);
            for (id, obj) in chunk {
                query = query
                    .bind(&self.writer_id)
                    .bind(*id)
                    .bind(&self.network)
                    .bind(self.generation)
                    .bind(*obj);
            }
            query
                .execute(&mut *tx)
                .await
                .map_err(backend("insert_many", &self.network))?;
        }
        tx.commit().await.map_err(backend("insert_many", &self.network))?;
        Ok(())
    }

    /// Atomically replace the network's committed object set with everything
    /// staged, provided this writer is still the newest generation and has not
    /// expired. Returns the number of objects committed.
    ///
    /// The writer is invalidated whatever the outcome.
    #[instrument(skip(self), fields(network = %self.network, generation = self.generation))]
    pub async fn apply(&mut self) -> Result<u64, StorageError> {
        if self.invalidated {
            return Err(self.invalid("apply to", InvalidWriterReason::AlreadyUsed));
        }
        self.invalidated = true;
        let _timer = LatencyTimer::new("apply");

        let result = self.commit().await;
        match &result {
            Ok(count) => {
                metrics::record_operation("apply", "success");
                metrics::record_objects_applied(*count);
                debug!(objects = count, "Cache writer applied");
            }
            Err(e) => {
                let status = if e.is_invalid_writer() { "rejected" } else { "error" };
                metrics::record_operation("apply", status);
                if let Err(cleanup) = self.discard_staging().await {
                    warn!(error = %cleanup, "Failed to discard staged rows of dead writer");
                }
            }
        }
        result
    }

    async fn commit(&self) -> Result<u64, StorageError> {
        let now = self.ctx.clock.now_millis();
        if now - self.generation > self.valid_interval_secs * 1000 {
            return Err(self.invalid("apply to", InvalidWriterReason::Expired));
        }

        let t = &self.ctx.tables;
        let op = "apply";
        let mut tx = self.ctx.pool.begin().await.map_err(backend(op, &self.network))?;

        // Generation compare-and-swap; the write also takes the lock that
        // serializes concurrent applies for this network.
        let won = if self.ctx.is_sqlite {
            let sql = format!(
                "INSERT INTO {} (network, generation) VALUES (?, ?)
                 ON CONFLICT(network) DO UPDATE SET generation = excluded.generation
                 WHERE {}.generation < excluded.generation",
                t.cache_generations, t.cache_generations
            );
            let result = sqlx::query(&sql)
                .bind(&self.network)
                .bind(self.generation)
                .execute(&mut *tx)
                .await
                .map_err(backend(op, &self.network))?;
            result.rows_affected() == 1
        } else {
            let select = format!(
                "SELECT generation FROM {} WHERE network = ? FOR UPDATE",
                t.cache_generations
            );
            let current = sqlx::query(&select)
                .bind(&self.network)
                .fetch_optional(&mut *tx)
                .await
                .map_err(backend(op, &self.network))?;
            let committed: Option<i64> = match current {
                Some(row) => Some(row.try_get("generation").map_err(backend(op, &self.network))?),
                None => None,
            };
            if committed.is_some_and(|g| g >= self.generation) {
                false
            } else {
                let upsert = format!(
                    "INSERT INTO {} (network, generation) VALUES (?, ?)
                     ON DUPLICATE KEY UPDATE generation = VALUES(generation)",
                    t.cache_generations
                );
                sqlx::query(&upsert)
                    .bind(&self.network)
                    .bind(self.generation)
                    .execute(&mut *tx)
                    .await
                    .map_err(backend(op, &self.network))?;
                true
            }
        };

        if !won {
            // Dropping the transaction rolls it back
            return Err(self.invalid("apply to", InvalidWriterReason::Superseded));
        }

        sqlx::query(&format!("DELETE FROM {} WHERE network = ?", t.cache_objects))
            .bind(&self.network)
            .execute(&mut *tx)
            .await
            .map_err(backend(op, &self.network))?;

        let copied = sqlx::query(&format!(
            "INSERT INTO {} (network, id, obj) SELECT network, id, obj FROM {} WHERE writer_id = ?",
            t.cache_objects, t.cache_staging
        ))
        .bind(&self.writer_id)
        .execute(&mut *tx)
        .await
        .map_err(backend(op, &self.network))?
        .rows_affected();

        sqlx::query(&format!("DELETE FROM {} WHERE writer_id = ?", t.cache_staging))
            .bind(&self.writer_id)
            .execute(&mut *tx)
            .await
            .map_err(backend(op, &self.network))?;

        tx.commit().await.map_err(backend(op, &self.network))?;
        Ok(copied)
    }

    async fn discard_staging(&self) -> Result<(), StorageError> {
        sqlx::query(&format!("DELETE FROM {} WHERE writer_id = ?", self.ctx.tables.cache_staging))
            .bind(&self.writer_id)
            .execute(&self.ctx.pool)
            .await
            .map_err(backend("discard_staging", &self.network))?;
        Ok(())
    }
}
