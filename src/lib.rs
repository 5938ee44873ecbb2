// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Sync Store
//!
//! Digest-keyed cache that lets many gateways check cheaply whether their
//! copy of a network's dataset is current, and pull it when it is not.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Producer (worker)                       │
//! │  • Computes per-network digest trees                       │
//! │  • Streams objects through a single-use CacheWriter        │
//! │  • apply() then set_digest()                               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  MySQL/SQLite (sqlx Any)                    │
//! │  • <prefix>_digests          one tree per network          │
//! │  • <prefix>_cache_objects    committed object sets         │
//! │  • <prefix>_cache_generations / _cache_staging             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Consumers (gateways)                     │
//! │  • Root digest match → no_updates                          │
//! │  • Otherwise page through the cache, or diff leaves        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//! use sync_store::{DigestTreeBuilder, SyncStore, SyncStoreConfig, SystemClock};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sync_store::StorageError> {
//!     let store = SyncStore::connect(SyncStoreConfig::default(), Arc::new(SystemClock)).await?;
//!
//!     let objects = BTreeMap::from([("IMSI00001".to_string(), b"subscriber".to_vec())]);
//!     let mut writer = store.update_cache("n0");
//!     writer.insert_many(&objects).await?;
//!     writer.apply().await?;
//!
//!     let tree = objects.iter().collect::<DigestTreeBuilder>().build();
//!     store.set_digest("n0", &tree).await?;
//!
//!     let (page, next) = store.get_cached_by_page("n0", "", 100).await?;
//!     assert_eq!(page.len(), 1);
//!     assert!(next.is_empty());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`coordinator`]: the [`SyncStore`] façade
//! - [`storage`]: digest store, cache store and writers, garbage collector
//! - [`digest`]: digest trees and a SHA-256 builder
//! - [`worker`]: periodic refresh driven by a [`DigestProducer`]
//! - [`gateway`]: consumer read path with the no-updates shortcut
//! - [`resilience`]: connection retry

pub mod clock;
pub mod config;
pub mod coordinator;
pub mod digest;
pub mod gateway;
pub mod metrics;
pub mod resilience;
pub mod storage;
pub mod worker;

pub use clock::{Clock, FrozenClock, SystemClock};
pub use config::{SyncStoreConfig, WorkerConfig};
pub use coordinator::SyncStore;
pub use digest::{DigestTree, DigestTreeBuilder, LeafDiff, LeafDigest};
pub use gateway::{ChangeSet, GatewaySync, ListRequest, ListResponse};
pub use metrics::LatencyTimer;
pub use resilience::retry::RetryConfig;
pub use storage::{
    CacheStore, CacheWriter, DigestRecord, DigestStore, GarbageCollector, GcReport, InvalidWriterReason,
    PageToken, StorageError, SyncStoreReader,
};
pub use worker::{CacheWorker, DigestProducer, ObjectPage, ProducerError, RenewReport, WorkerError};
