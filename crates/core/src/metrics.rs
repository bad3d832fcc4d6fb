//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Polling of the daemon and connectivity
//! - Reconciliation of snapshots into the store
//! - Batch operations

use once_cell::sync::Lazy;
use prometheus::{Gauge, Histogram, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Polling Metrics
// =============================================================================

/// Polls total by result.
pub static POLLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("qbdeck_polls_total", "Total maindata polls"),
        &["result"], // "ok", "transport_error", "error"
    )
    .unwrap()
});

/// Poll round-trip duration in seconds.
pub static POLL_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "qbdeck_poll_duration_seconds",
            "Duration of one maindata poll",
        )
        .buckets(vec![0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
    )
    .unwrap()
});

/// 1 while connectivity is degraded.
pub static CONNECTIVITY_DEGRADED: Lazy<Gauge> = Lazy::new(|| {
    Gauge::new(
        "qbdeck_connectivity_degraded",
        "Whether the daemon is currently considered unreachable",
    )
    .unwrap()
});

// =============================================================================
// Store Metrics
// =============================================================================

/// Reconciliations by snapshot kind and result.
pub static RECONCILIATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "qbdeck_reconciliations_total",
            "Total snapshots offered to the store",
        ),
        &["kind", "result"], // result: "applied", "rejected"
    )
    .unwrap()
});

pub static STORE_TORRENTS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("qbdeck_store_torrents", "Torrents currently in the store").unwrap()
});

pub static SELECTION_SIZE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("qbdeck_selection_size", "Torrents currently selected").unwrap()
});

// =============================================================================
// Batch Metrics
// =============================================================================

/// Batch operations by action and final status.
pub static BATCH_OPERATIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("qbdeck_batch_operations_total", "Total batch operations"),
        &["action", "status"],
    )
    .unwrap()
});

/// Batch duration in seconds.
pub static BATCH_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "qbdeck_batch_duration_seconds",
            "Duration of a batch operation",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["action"],
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Polling
        Box::new(POLLS.clone()),
        Box::new(POLL_DURATION.clone()),
        Box::new(CONNECTIVITY_DEGRADED.clone()),
        // Store
        Box::new(RECONCILIATIONS.clone()),
        Box::new(STORE_TORRENTS.clone()),
        Box::new(SELECTION_SIZE.clone()),
        // Batch
        Box::new(BATCH_OPERATIONS.clone()),
        Box::new(BATCH_DURATION.clone()),
    ]
}
