//! Prometheus metrics for observability.
//!
//! This module provides metrics for monitoring the qbdeck server:
//! - HTTP request metrics (latency, counts, errors)
//! - WebSocket connection metrics
//! - Engine status (collected dynamically)

use once_cell::sync::Lazy;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

// =============================================================================
// HTTP Request Metrics
// =============================================================================

/// HTTP request duration in seconds.
pub static HTTP_REQUEST_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "qbdeck_http_request_duration_seconds",
            "HTTP request duration in seconds",
        )
        .buckets(vec![
            0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
        ]),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests total count.
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("qbdeck_http_requests_total", "Total HTTP requests"),
        &["method", "path", "status"],
    )
    .unwrap()
});

/// HTTP requests currently in flight.
pub static HTTP_REQUESTS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "qbdeck_http_requests_in_flight",
        "Number of HTTP requests currently being processed",
    )
    .unwrap()
});

// =============================================================================
// WebSocket Metrics
// =============================================================================

/// Active WebSocket connections.
pub static WS_CONNECTIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "qbdeck_ws_connections_active",
        "Number of active WebSocket connections",
    )
    .unwrap()
});

/// Total WebSocket connections (cumulative).
pub static WS_CONNECTIONS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "qbdeck_ws_connections_total",
        "Total WebSocket connections since startup",
    )
    .unwrap()
});

/// WebSocket messages sent by type.
pub static WS_MESSAGES_SENT: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("qbdeck_ws_messages_sent_total", "WebSocket messages sent"),
        &["type"],
    )
    .unwrap()
});

/// WebSocket lag events (when client falls behind).
pub static WS_LAG_EVENTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "qbdeck_ws_lag_events_total",
        "WebSocket lag events (client fell behind)",
    )
    .unwrap()
});

// =============================================================================
// Engine Metrics (collected dynamically)
// =============================================================================

/// Engine running state (1 = running, 0 = stopped).
pub static ENGINE_RUNNING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "qbdeck_engine_running",
        "Whether the poll loop is running (1) or stopped (0)",
    )
    .unwrap()
});

/// Batch pending (1 = a batch is in flight).
pub static BATCH_PENDING: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "qbdeck_batch_pending",
        "Whether a batch operation is in flight",
    )
    .unwrap()
});

/// Store revision.
pub static STORE_REVISION: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "qbdeck_store_revision",
        "Number of reconciliations applied since startup",
    )
    .unwrap()
});

fn register_metrics(registry: &Registry) {
    // HTTP
    registry
        .register(Box::new(HTTP_REQUEST_DURATION.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .unwrap();
    registry
        .register(Box::new(HTTP_REQUESTS_IN_FLIGHT.clone()))
        .unwrap();

    // WebSocket
    registry
        .register(Box::new(WS_CONNECTIONS_ACTIVE.clone()))
        .unwrap();
    registry
        .register(Box::new(WS_CONNECTIONS_TOTAL.clone()))
        .unwrap();
    registry.register(Box::new(WS_MESSAGES_SENT.clone())).unwrap();
    registry.register(Box::new(WS_LAG_EVENTS.clone())).unwrap();

    // Engine
    registry.register(Box::new(ENGINE_RUNNING.clone())).unwrap();
    registry.register(Box::new(BATCH_PENDING.clone())).unwrap();
    registry.register(Box::new(STORE_REVISION.clone())).unwrap();

    // Core metrics (polling, reconciliation, batches)
    for metric in qbdeck_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Collect dynamic metrics from current application state.
///
/// This is called before encoding metrics to update gauges with current values
/// from the sync engine.
pub async fn collect_dynamic_metrics(state: &crate::state::AppState) {
    let status = state.engine().status().await;
    ENGINE_RUNNING.set(if status.running { 1 } else { 0 });
    BATCH_PENDING.set(if status.batch_pending { 1 } else { 0 });
    STORE_REVISION.set(status.revision as i64);
}

static UUID_RE: Lazy<regex_lite::Regex> = Lazy::new(|| {
    regex_lite::Regex::new(
        r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .unwrap()
});

// v1 info hashes are 40 hex chars, v2 ones 64.
static HASH_RE: Lazy<regex_lite::Regex> =
    Lazy::new(|| regex_lite::Regex::new(r"[0-9a-fA-F]{64}|[0-9a-fA-F]{40}").unwrap());

/// Normalize a path for metric labels (replace IDs with placeholders).
pub fn normalize_path(path: &str) -> String {
    let result = UUID_RE.replace_all(path, "{id}");
    let result = HASH_RE.replace_all(&result, "{hash}");
    result.to_string()
}
