// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL-backed storage components.
//!
//! - [`digest_store`]: one digest tree per network, timestamped on write
//! - [`cache_store`]: per-network object sets, rebuilt by single-use writers
//! - [`gc`]: removal of networks that no longer exist
//! - [`page_token`]: opaque pagination cursor

pub mod cache_store;
pub mod digest_store;
pub mod gc;
pub mod page_token;
pub(crate) mod sql;
pub mod traits;

pub use cache_store::{CacheStore, CacheWriter};
pub use digest_store::{DigestRecord, DigestStore};
pub use gc::{GarbageCollector, GcReport};
pub use page_token::PageToken;
pub use sql::TableNames;
pub use traits::{InvalidWriterReason, StorageError, SyncStoreReader};
