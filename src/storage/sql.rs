// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Shared SQL plumbing: pool setup, table naming and schema.
//!
//! Every table is namespaced by `table_name_prefix`:
//!
//! ```sql
//! CREATE TABLE <prefix>_digests (
//!   network VARCHAR(255) PRIMARY KEY,
//!   encoded_digest_tree LONGTEXT NOT NULL,   -- JSON DigestTree
//!   last_updated_unix_seconds BIGINT NOT NULL
//! );
//! CREATE TABLE <prefix>_cache_objects (
//!   network VARCHAR(255), id VARCHAR(255), obj LONGBLOB,
//!   PRIMARY KEY (network, id)
//! );
//! CREATE TABLE <prefix>_cache_generations (   -- last committed writer per network
//!   network VARCHAR(255) PRIMARY KEY,
//!   generation BIGINT NOT NULL               -- writer creation time, unix millis
//! );
//! CREATE TABLE <prefix>_cache_staging (       -- rows of writers not yet applied
//!   writer_id VARCHAR(64), id VARCHAR(255), network VARCHAR(255),
//!   generation BIGINT, obj LONGBLOB,
//!   PRIMARY KEY (writer_id, id)
//! );
//! ```
//!
//! ## sqlx Any Driver Quirks
//!
//! The `Any` driver hands MySQL TEXT columns back as BLOB, so text reads go
//! through [`read_text`] which accepts either.

use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing::info;

use super::traits::{backend, StorageError};
use crate::clock::Clock;
use crate::config::SyncStoreConfig;
use crate::resilience::retry::{retry, RetryConfig};

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

pub(crate) fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

/// Open a pool, retrying with the startup policy (fails fast if config is wrong).
pub(crate) async fn connect_pool(config: &SyncStoreConfig) -> Result<(AnyPool, bool), StorageError> {
    install_drivers();

    let is_sqlite = config.sql_url.starts_with("sqlite:");
    let url = config.sql_url.as_str();

    let pool = retry("sql_connect", &RetryConfig::startup(), || async {
        AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .connect(url)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))
    })
    .await?;

    if is_sqlite {
        // Readers don't block the apply transaction
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&pool)
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to enable WAL mode: {}", e)))?;
        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&pool)
            .await
            .map_err(|e| StorageError::Connection(format!("Failed to set synchronous mode: {}", e)))?;
    }

    info!(sqlite = is_sqlite, "SQL pool connected");
    Ok((pool, is_sqlite))
}

/// Fully qualified table names for one store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableNames {
    pub digests: String,
    pub cache_objects: String,
    pub cache_generations: String,
    pub cache_staging: String,
}

impl TableNames {
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            digests: format!("{}_digests", prefix),
            cache_objects: format!("{}_cache_objects", prefix),
            cache_generations: format!("{}_cache_generations", prefix),
            cache_staging: format!("{}_cache_staging", prefix),
        }
    }
}

/// Everything the individual stores share: one pool, one dialect, one clock.
#[derive(Clone)]
pub(crate) struct SqlContext {
    pub pool: AnyPool,
    pub is_sqlite: bool,
    pub tables: Arc<TableNames>,
    pub clock: Arc<dyn Clock>,
}

impl SqlContext {
    pub fn new(pool: AnyPool, is_sqlite: bool, prefix: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            is_sqlite,
            tables: Arc::new(TableNames::with_prefix(prefix)),
            clock,
        }
    }

    /// Create all tables if absent. Additive, safe on every start.
    pub async fn init_schema(&self) -> Result<(), StorageError> {
        let t = &self.tables;
        let statements = if self.is_sqlite {
            vec![
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        network TEXT PRIMARY KEY,
                        encoded_digest_tree TEXT NOT NULL,
                        last_updated_unix_seconds INTEGER NOT NULL
                    )",
                    t.digests
                ),
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        network TEXT NOT NULL,
                        id TEXT NOT NULL,
                        obj BLOB NOT NULL,
                        PRIMARY KEY (network, id)
                    )",
                    t.cache_objects
                ),
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        network TEXT PRIMARY KEY,
                        generation INTEGER NOT NULL
                    )",
                    t.cache_generations
                ),
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        writer_id TEXT NOT NULL,
                        id TEXT NOT NULL,
                        network TEXT NOT NULL,
                        generation INTEGER NOT NULL,
                        obj BLOB NOT NULL,
                        PRIMARY KEY (writer_id, id)
                    )",
                    t.cache_staging
                ),
                format!(
                    "CREATE INDEX IF NOT EXISTS idx_{0}_network ON {0}(network)",
                    t.cache_staging
                ),
            ]
        } else {
            // utf8mb4_bin keeps id ordering lexical (byte-wise) for pagination
            vec![
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        network VARCHAR(255) NOT NULL PRIMARY KEY,
                        encoded_digest_tree LONGTEXT NOT NULL,
                        last_updated_unix_seconds BIGINT NOT NULL,
                        INDEX idx_last_updated (last_updated_unix_seconds)
                    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_bin",
                    t.digests
                ),
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        network VARCHAR(255) NOT NULL,
                        id VARCHAR(255) NOT NULL,
                        obj LONGBLOB NOT NULL,
                        PRIMARY KEY (network, id)
                    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_bin",
                    t.cache_objects
                ),
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        network VARCHAR(255) NOT NULL PRIMARY KEY,
                        generation BIGINT NOT NULL
                    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_bin",
                    t.cache_generations
                ),
                format!(
                    "CREATE TABLE IF NOT EXISTS {} (
                        writer_id VARCHAR(64) NOT NULL,
                        id VARCHAR(255) NOT NULL,
                        network VARCHAR(255) NOT NULL,
                        generation BIGINT NOT NULL,
                        obj LONGBLOB NOT NULL,
                        PRIMARY KEY (writer_id, id),
                        INDEX idx_staging_network (network)
                    ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_bin",
                    t.cache_staging
                ),
            ]
        };

        for stmt in &statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(backend("initialize", "*"))?;
        }

        info!(prefix = %t.digests.trim_end_matches("_digests"), "Sync store schema initialized");
        Ok(())
    }
}

/// Read a text column, accepting the BLOB the `Any` driver returns for MySQL TEXT.
pub(crate) fn read_text(row: &AnyRow, column: &str) -> Result<String, sqlx::Error> {
    match row.try_get::<String, _>(column) {
        Ok(s) => Ok(s),
        Err(_) => {
            let bytes: Vec<u8> = row.try_get(column)?;
            String::from_utf8(bytes).map_err(|e| sqlx::Error::Decode(Box::new(e)))
        }
    }
}

/// `?, ?, ?` for an IN clause of `n` values.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
