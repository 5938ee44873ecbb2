// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for sync-store.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host process is responsible for choosing the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `sync_store_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `operation`: set_digest, get_digests, insert_many, apply, get_cached_by_id, ...
//! - `status`: success, error, rejected

use metrics::{counter, histogram};
use std::time::{Duration, Instant};

/// Record the outcome of a store operation
pub fn record_operation(operation: &str, status: &str) {
    counter!(
        "sync_store_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record operation latency
pub fn record_latency(operation: &str, duration: Duration) {
    histogram!(
        "sync_store_operation_seconds",
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record a cache writer refused at apply/insert time
pub fn record_writer_rejected(reason: &str) {
    counter!(
        "sync_store_cache_writer_rejected_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// Record rows staged by `insert_many`
pub fn record_objects_staged(count: usize) {
    counter!("sync_store_objects_staged_total").increment(count as u64);
}

/// Record the size of a committed object set
pub fn record_objects_applied(count: u64) {
    histogram!("sync_store_applied_set_size").record(count as f64);
}

/// Record rows reclaimed by garbage collection
pub fn record_gc(digests: u64, objects: u64, staged: u64) {
    counter!("sync_store_gc_digests_deleted_total").increment(digests);
    counter!("sync_store_gc_objects_deleted_total").increment(objects);
    counter!("sync_store_gc_staged_deleted_total").increment(staged);
}

/// Record one refresh pass of the cache worker
pub fn record_worker_pass(renewed: usize, rebuilt: usize, failed: usize) {
    counter!("sync_store_worker_passes_total").increment(1);
    counter!("sync_store_worker_digests_renewed_total").increment(renewed as u64);
    counter!("sync_store_worker_caches_rebuilt_total").increment(rebuilt as u64);
    counter!("sync_store_worker_network_failures_total").increment(failed as u64);
}

/// Record a gateway request answered without payload
pub fn record_gateway_no_updates() {
    counter!("sync_store_gateway_no_updates_total").increment(1);
}

/// Timer that records latency on drop
pub struct LatencyTimer {
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    /// Start a new latency timer
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_latency(self.operation, self.start.elapsed());
    }
}

/// Record success/error for a result and pass it through.
pub(crate) fn observe<T, E>(operation: &'static str, result: Result<T, E>) -> Result<T, E> {
    record_operation(operation, if result.is_ok() { "success" } else { "error" });
    result
}
