// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync store façade.
//!
//! [`SyncStore`] bundles the three storage components over one pool:
//! - [`DigestStore`]: per-network digest trees
//! - [`CacheStore`]: per-network object sets and their writers
//! - [`GarbageCollector`]: removal of dead networks
//!
//! # Caller contract
//!
//! Producers must commit a network's cache before publishing its digest:
//!
//! ```text
//! writer = update_cache(n) → insert_many(..)* → apply() → set_digest(n, tree)
//! ```
//!
//! Reversed, a consumer could see a new digest, conclude it is current, and
//! then read the previous object set.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//! use sync_store::{DigestTree, SyncStore, SyncStoreConfig, SystemClock};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), sync_store::StorageError> {
//! let config = SyncStoreConfig {
//!     sql_url: "sqlite:subscribers.db?mode=rwc".into(),
//!     table_name_prefix: "subscriberdb".into(),
//!     ..Default::default()
//! };
//! let store = SyncStore::connect(config, Arc::new(SystemClock)).await?;
//!
//! let mut writer = store.update_cache("n0");
//! let objects = BTreeMap::from([("IMSI00001".to_string(), b"sub".to_vec())]);
//! writer.insert_many(&objects).await?;
//! writer.apply().await?;
//! store.set_digest("n0", &DigestTree::root_only("abc")).await?;
//! # Ok(())
//! # }
//! ```

mod api;

use sqlx::AnyPool;
use std::sync::Arc;
use tracing::info;

use crate::clock::Clock;
use crate::config::SyncStoreConfig;
use crate::storage::sql::{connect_pool, SqlContext};
use crate::storage::traits::StorageError;
use crate::storage::{CacheStore, DigestStore, GarbageCollector};

/// Handle to one sync store. Cheap to clone; clones share the pool.
#[derive(Clone)]
pub struct SyncStore {
    pub(super) config: Arc<SyncStoreConfig>,
    pub(super) ctx: SqlContext,
    pub(super) digests: DigestStore,
    pub(super) cache: CacheStore,
    pub(super) gc: GarbageCollector,
}

impl std::fmt::Debug for SyncStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncStore")
            .field("table_name_prefix", &self.config.table_name_prefix)
            .field("is_sqlite", &self.ctx.is_sqlite)
            .finish()
    }
}

impl SyncStore {
    /// Connect to `config.sql_url` and create the tables if needed.
    #[tracing::instrument(skip(config, clock), fields(prefix = %config.table_name_prefix))]
    pub async fn connect(config: SyncStoreConfig, clock: Arc<dyn Clock>) -> Result<Self, StorageError> {
        config.validate()?;
        let (pool, is_sqlite) = connect_pool(&config).await?;
        let store = Self::from_pool(pool, is_sqlite, config, clock)?;
        store.initialize().await?;
        info!("Sync store ready");
        Ok(store)
    }

    /// Wrap an existing pool. Does not touch the schema; call
    /// [`initialize`](Self::initialize) when the tables may be missing.
    pub fn from_pool(
        pool: AnyPool,
        is_sqlite: bool,
        config: SyncStoreConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StorageError> {
        config.validate()?;
        let ctx = SqlContext::new(pool, is_sqlite, &config.table_name_prefix, clock);
        Ok(Self {
            digests: DigestStore::new(ctx.clone()),
            cache: CacheStore::new(ctx.clone(), &config),
            gc: GarbageCollector::new(ctx.clone(), config.cache_writer_valid_interval_secs),
            config: Arc::new(config),
            ctx,
        })
    }

    /// Create the store's tables if absent. Safe to call repeatedly.
    pub async fn initialize(&self) -> Result<(), StorageError> {
        self.ctx.init_schema().await
    }

    #[must_use]
    pub fn config(&self) -> &SyncStoreConfig {
        &self.config
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.ctx.clock
    }

    pub fn digests(&self) -> &DigestStore {
        &self.digests
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn garbage_collector(&self) -> &GarbageCollector {
        &self.gc
    }

    /// Close the underlying pool.
    pub async fn close(&self) {
        self.ctx.pool.close().await;
    }
}
