// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Reclaims everything belonging to networks that no longer exist.
//!
//! One transaction sweeps all four tables, so readers never observe a
//! network with a digest but no cache (or the reverse) mid-collection.
//! The same pass drops staging rows of writers too old to ever apply.

use std::collections::BTreeSet;
use tracing::{info, instrument};

use super::sql::{placeholders, SqlContext};
use super::traits::{backend, StorageError};
use crate::clock::Clock;
use crate::metrics::{self, LatencyTimer};

/// Rows removed by one collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcReport {
    pub digests: u64,
    pub objects: u64,
    pub generations: u64,
    pub staged: u64,
}

impl GcReport {
    pub fn total(&self) -> u64 {
        self.digests + self.objects + self.generations + self.staged
    }
}

#[derive(Clone)]
pub struct GarbageCollector {
    ctx: SqlContext,
    valid_interval_secs: i64,
}

impl GarbageCollector {
    pub(crate) fn new(ctx: SqlContext, valid_interval_secs: i64) -> Self {
        Self {
            ctx,
            valid_interval_secs,
        }
    }

    /// Delete digests, cached objects, generations and staged rows of every
    /// network not in `keep`. An empty `keep` removes everything.
    #[instrument(skip(self, keep), fields(keep = keep.len()))]
    pub async fn collect_garbage(&self, keep: &BTreeSet<String>) -> Result<GcReport, StorageError> {
        let _timer = LatencyTimer::new("collect_garbage");
        let result = metrics::observe("collect_garbage", self.sweep(keep).await);
        if let Ok(report) = &result {
            metrics::record_gc(report.digests, report.objects, report.staged);
            if report.total() > 0 {
                info!(
                    digests = report.digests,
                    objects = report.objects,
                    generations = report.generations,
                    staged = report.staged,
                    "Garbage collected"
                );
            }
        }
        result
    }

    async fn sweep(&self, keep: &BTreeSet<String>) -> Result<GcReport, StorageError> {
        let t = &self.ctx.tables;
        let op = "collect_garbage";
        let keep: Vec<&String> = keep.iter().collect();
        let filter = if keep.is_empty() {
            String::new()
        } else {
            format!("network NOT IN ({})", placeholders(keep.len()))
        };

        let mut tx = self.ctx.pool.begin().await.map_err(backend(op, "*"))?;
        let mut report = GcReport::default();

        for (table, slot) in [
            (&t.digests, &mut report.digests),
            (&t.cache_objects, &mut report.objects),
            (&t.cache_generations, &mut report.generations),
        ] {
            let sql = if filter.is_empty() {
                format!("DELETE FROM {}", table)
            } else {
                format!("DELETE FROM {} WHERE {}", table, filter)
            };
            let mut query = sqlx::query(&sql);
            for network in &keep {
                query = query.bind(*network);
            }
            *slot = query.execute(&mut *tx).await.map_err(backend(op, "*"))?.rows_affected();
        }

        // Staging: dead networks, plus writers past their validity window
        let stale_before = self.ctx.clock.now_millis() - self.valid_interval_secs * 1000;
        let sql = if filter.is_empty() {
            format!("DELETE FROM {}", t.cache_staging)
        } else {
            format!("DELETE FROM {} WHERE {} OR generation < ?", t.cache_staging, filter)
        };
        let mut query = sqlx::query(&sql);
        if !filter.is_empty() {
            for network in &keep {
                query = query.bind(*network);
            }
            query = query.bind(stale_before);
        }
        report.staged = query.execute(&mut *tx).await.map_err(backend(op, "*"))?.rows_affected();

        tx.commit().await.map_err(backend(op, "*"))?;
        Ok(report)
    }
}
