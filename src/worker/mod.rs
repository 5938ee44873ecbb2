// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Periodic refresh of digests and caches.
//!
//! Each pass:
//!
//! ```text
//! live = producer.live_networks()
//! collect_garbage(live)
//! for n in (live without digest) ∪ (digest older than update_interval):
//!     tree = producer.digest_tree(n)
//!     if stored root == tree root:  set_digest(n, tree)          // timestamp only
//!     else:                         rebuild cache, apply, set_digest
//! ```
//!
//! Several workers may run against the same store. Overlapping rebuilds of
//! one network are settled by the cache writer generation check; the loser
//! counts as a failure for that pass and the network is picked up again later.

pub mod producer;

pub use producer::{DigestProducer, ObjectPage, ProducerError};

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::config::WorkerConfig;
use crate::coordinator::SyncStore;
use crate::metrics;
use crate::storage::{GcReport, StorageError};

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Producer(#[from] ProducerError),
}

/// What one pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenewReport {
    pub gc: GcReport,
    /// Unchanged networks whose digest timestamp was refreshed.
    pub renewed: Vec<String>,
    /// Networks whose cache and digest were rebuilt.
    pub rebuilt: Vec<String>,
    pub failed: Vec<String>,
}

enum Outcome {
    Renewed,
    Rebuilt(u64),
}

pub struct CacheWorker<P: DigestProducer> {
    store: SyncStore,
    producer: Arc<P>,
    config: WorkerConfig,
}

impl<P: DigestProducer> CacheWorker<P> {
    pub fn new(store: SyncStore, producer: Arc<P>, config: WorkerConfig) -> Result<Self, StorageError> {
        config.validate(store.config())?;
        Ok(Self {
            store,
            producer,
            config,
        })
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// One refresh pass. Only failures to list live networks or to collect
    /// garbage abort the pass; per-network failures are reported.
    #[instrument(skip(self))]
    pub async fn renew_once(&self) -> Result<RenewReport, WorkerError> {
        let live = self.producer.live_networks().await?;
        let gc = self.store.collect_garbage(&live).await?;

        let tracked: BTreeSet<String> = self.store.tracked_networks().await?.into_iter().collect();
        let mut targets: BTreeSet<String> = live.into_iter().filter(|n| !tracked.contains(n)).collect();
        targets.extend(self.store.outdated_networks(self.config.update_interval_secs).await?);

        let mut report = RenewReport {
            gc,
            ..Default::default()
        };
        for network in targets {
            match self.renew_network(&network).await {
                Ok(Outcome::Renewed) => report.renewed.push(network),
                Ok(Outcome::Rebuilt(objects)) => {
                    debug!(network = %network, objects, "Cache rebuilt");
                    report.rebuilt.push(network);
                }
                Err(WorkerError::Storage(e)) if e.is_invalid_writer() => {
                    warn!(network = %network, error = %e, "Cache rebuild lost to a concurrent writer");
                    report.failed.push(network);
                }
                Err(e) => {
                    warn!(network = %network, error = %e, "Failed to renew network");
                    report.failed.push(network);
                }
            }
        }

        metrics::record_worker_pass(report.renewed.len(), report.rebuilt.len(), report.failed.len());
        info!(
            renewed = report.renewed.len(),
            rebuilt = report.rebuilt.len(),
            failed = report.failed.len(),
            "Refresh pass complete"
        );
        Ok(report)
    }

    async fn renew_network(&self, network: &str) -> Result<Outcome, WorkerError> {
        let tree = self.producer.digest_tree(network).await?;
        let current = self.store.get_digest(network).await?;

        if current.is_some_and(|record| record.tree.root_digest == tree.root_digest) {
            self.store.set_digest(network, &tree).await?;
            return Ok(Outcome::Renewed);
        }

        let objects = self.rebuild_cache(network).await?;
        self.store.set_digest(network, &tree).await?;
        Ok(Outcome::Rebuilt(objects))
    }

    async fn rebuild_cache(&self, network: &str) -> Result<u64, WorkerError> {
        let mut writer = self.store.update_cache(network);
        let mut token = String::new();
        loop {
            let page = self.producer.load_page(network, &token).await?;
            writer.insert_many(&page.objects).await?;
            if page.next_token.is_empty() {
                break;
            }
            token = page.next_token;
        }
        Ok(writer.apply().await?)
    }

    /// Refresh every `sleep_interval_secs` until `shutdown` carries `true` or
    /// its sender is dropped. The first pass starts immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            sleep_interval_secs = self.config.sleep_interval_secs,
            update_interval_secs = self.config.update_interval_secs,
            "Cache worker running"
        );
        let mut ticker = tokio::time::interval(Duration::from_secs(self.config.sleep_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                _ = ticker.tick() => {
                    if let Err(e) = self.renew_once().await {
                        error!(error = %e, "Refresh pass failed");
                    }
                }
            }
        }
        info!("Cache worker stopped");
    }
}
