// Prometheus metrics definitions for the score service.

use std::sync::Once;

use lazy_static::lazy_static;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // ── Counters ─────────────────────────────────────────────────────

    /// Scores accepted and persisted.
    pub static ref SCORES_SUBMITTED_TOTAL: IntCounter = IntCounter::new(
        "button_scores_submitted_total",
        "Scores accepted and persisted",
    )
    .unwrap();

    /// Submissions rejected before reaching the store.
    pub static ref VALIDATION_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "button_validation_failures_total",
        "Requests rejected by input validation",
    )
    .unwrap();

    /// Backing document reads or writes that failed.
    pub static ref PERSISTENCE_ERRORS_TOTAL: IntCounter = IntCounter::new(
        "button_persistence_errors_total",
        "Failed backing document reads or writes",
    )
    .unwrap();

    /// Game sessions, by lifecycle event (started, completed).
    pub static ref SESSIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("button_sessions_total", "Game session lifecycle events"),
        &["event"],
    )
    .unwrap();

    /// Total API requests, by method/endpoint/status.
    pub static ref API_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("button_api_requests_total", "Total API requests"),
        &["method", "endpoint", "status"],
    )
    .unwrap();

    // ── Histograms ───────────────────────────────────────────────────

    /// API request duration in seconds, by endpoint.
    pub static ref API_REQUEST_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "button_api_request_duration_seconds",
            "API request duration in seconds",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0]),
        &["endpoint"],
    )
    .unwrap();
}

static REGISTER: Once = Once::new();

/// Register all metrics with the custom registry. Safe to call more than once.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(SCORES_SUBMITTED_TOTAL.clone()),
            Box::new(VALIDATION_FAILURES_TOTAL.clone()),
            Box::new(PERSISTENCE_ERRORS_TOTAL.clone()),
            Box::new(SESSIONS_TOTAL.clone()),
            Box::new(API_REQUESTS_TOTAL.clone()),
            Box::new(API_REQUEST_DURATION_SECONDS.clone()),
        ];

        for c in collectors {
            if let Err(e) = REGISTRY.register(c) {
                tracing::warn!("failed to register metric: {e}");
            }
        }
    });
}

/// Serialize all registered metrics to the Prometheus text exposition format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("failed to encode metrics: {e}");
        return String::new();
    }
    String::from_utf8_lossy(&buffer).into_owned()
}

/// Normalize a URL path for metric labels: replace session ids with `:id`
/// to prevent cardinality explosion.
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.parse::<uuid::Uuid>().is_ok() || segment.parse::<i64>().is_ok() {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
