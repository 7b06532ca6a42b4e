//! Metrics registry
//!
//! Counters only, monotonic, reset on process start.

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters for compile, execute and subscription work
///
/// Relaxed ordering throughout: counters are observed, never synchronized on.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    queries_compiled: AtomicU64,
    queries_rejected: AtomicU64,
    commands_executed: AtomicU64,
    store_calls: AtomicU64,
    markers_registered: AtomicU64,
    markers_removed: AtomicU64,
    refreshes: AtomicU64,
    results_dropped: AtomicU64,
    scheduler_ticks: AtomicU64,
}

impl MetricsRegistry {
    /// Create a new metrics registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment compiled query count
    pub fn increment_queries_compiled(&self) {
        self.queries_compiled.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment rejected query count
    pub fn increment_queries_rejected(&self) {
        self.queries_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment executed command count
    pub fn increment_commands_executed(&self) {
        self.commands_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment store RPC count
    pub fn increment_store_calls(&self) {
        self.store_calls.fetch_add(1, Ordering::Relaxed);
    }

    /// Add registered markers
    pub fn add_markers_registered(&self, n: u64) {
        self.markers_registered.fetch_add(n, Ordering::Relaxed);
    }

    /// Add removed markers
    pub fn add_markers_removed(&self, n: u64) {
        self.markers_removed.fetch_add(n, Ordering::Relaxed);
    }

    /// Increment live query refreshes
    pub fn increment_refreshes(&self) {
        self.refreshes.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment discarded late results
    pub fn increment_results_dropped(&self) {
        self.results_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment scheduler ticks
    pub fn increment_scheduler_ticks(&self) {
        self.scheduler_ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current snapshot of all metrics as JSON
    pub fn to_json(&self) -> String {
        let s = self.snapshot();
        serde_json::json!({
            "queries_compiled": s.queries_compiled,
            "queries_rejected": s.queries_rejected,
            "commands_executed": s.commands_executed,
            "store_calls": s.store_calls,
            "markers_registered": s.markers_registered,
            "markers_removed": s.markers_removed,
            "refreshes": s.refreshes,
            "results_dropped": s.results_dropped,
            "scheduler_ticks": s.scheduler_ticks,
        })
        .to_string()
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queries_compiled: self.queries_compiled.load(Ordering::Relaxed),
            queries_rejected: self.queries_rejected.load(Ordering::Relaxed),
            commands_executed: self.commands_executed.load(Ordering::Relaxed),
            store_calls: self.store_calls.load(Ordering::Relaxed),
            markers_registered: self.markers_registered.load(Ordering::Relaxed),
            markers_removed: self.markers_removed.load(Ordering::Relaxed),
            refreshes: self.refreshes.load(Ordering::Relaxed),
            results_dropped: self.results_dropped.load(Ordering::Relaxed),
            scheduler_ticks: self.scheduler_ticks.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time snapshot of all metrics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queries_compiled: u64,
    pub queries_rejected: u64,
    pub commands_executed: u64,
    pub store_calls: u64,
    pub markers_registered: u64,
    pub markers_removed: u64,
    pub refreshes: u64,
    pub results_dropped: u64,
    pub scheduler_ticks: u64,
}
