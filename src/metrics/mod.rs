//! Prometheus metrics for the search service.
//!
//! Everything registers against a single process-wide registry exposed by
//! the `/metrics` route:
//! - Search requests by strategy and outcome
//! - Search, facet and suggestion latency
//! - Cache lookups and backend calls
//! - Connection state and dropped analytics events
//!
//! # Example
//! ```no_run
//! use catalog_search::metrics::{init_metrics, SEARCH_REQUESTS};
//!
//! init_metrics().expect("metrics registered once");
//! SEARCH_REQUESTS
//!     .with_label_values(&["best_fields", "ok"])
//!     .inc();
//! ```

use lazy_static::lazy_static;
use prometheus::{
    HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
};

const NAMESPACE: &str = "catalog_search";

lazy_static! {
    /// Global Prometheus registry for all metrics
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    // ============================================================================
    // Search Metrics
    // ============================================================================

    /// Total number of search requests
    ///
    /// Labels: strategy, outcome
    pub static ref SEARCH_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("search_requests_total", "Total number of search requests")
            .namespace(NAMESPACE),
        &["strategy", "outcome"]
    ).expect("Failed to create SEARCH_REQUESTS metric");

    /// End-to-end latency in seconds
    ///
    /// Labels: operation (search, facets, suggest)
    pub static ref SEARCH_LATENCY: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "search_duration_seconds",
            "Search operation duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["operation"]
    ).expect("Failed to create SEARCH_LATENCY metric");

    /// Suggestion sections that degraded to empty
    ///
    /// Labels: section
    pub static ref SUGGESTION_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("suggestion_failures_total", "Suggestion lookups that failed")
            .namespace(NAMESPACE),
        &["section"]
    ).expect("Failed to create SUGGESTION_FAILURES metric");

    // ============================================================================
    // Cache Metrics
    // ============================================================================

    /// Result cache lookups
    ///
    /// Labels: outcome (hit, miss, error)
    pub static ref CACHE_LOOKUPS: IntCounterVec = IntCounterVec::new(
        Opts::new("cache_lookups_total", "Result cache lookups")
            .namespace(NAMESPACE),
        &["outcome"]
    ).expect("Failed to create CACHE_LOOKUPS metric");

    // ============================================================================
    // Backend Metrics
    // ============================================================================

    /// Backend calls after retries settle
    ///
    /// Labels: operation, outcome
    pub static ref BACKEND_REQUESTS: IntCounterVec = IntCounterVec::new(
        Opts::new("backend_requests_total", "Search backend requests")
            .namespace(NAMESPACE),
        &["operation", "outcome"]
    ).expect("Failed to create BACKEND_REQUESTS metric");

    /// Retries issued against the backend
    ///
    /// Labels: operation
    pub static ref BACKEND_RETRIES: IntCounterVec = IntCounterVec::new(
        Opts::new("backend_retries_total", "Search backend retries")
            .namespace(NAMESPACE),
        &["operation"]
    ).expect("Failed to create BACKEND_RETRIES metric");

    /// Connection state (0=disconnected, 1=connecting, 2=connected, 3=degraded)
    pub static ref CONNECTION_STATE: IntGauge = IntGauge::with_opts(
        Opts::new("connection_state", "Search backend connection state")
            .namespace(NAMESPACE)
    ).expect("Failed to create CONNECTION_STATE metric");

    // ============================================================================
    // Analytics Metrics
    // ============================================================================

    /// Analytics events dropped because the queue was full or closed
    pub static ref ANALYTICS_DROPPED: IntCounter = IntCounter::with_opts(
        Opts::new("analytics_dropped_total", "Analytics events dropped")
            .namespace(NAMESPACE)
    ).expect("Failed to create ANALYTICS_DROPPED metric");
}

/// Register every metric with the global registry.
///
/// Must be called once at startup; a second call reports duplicate
/// registration.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    PROMETHEUS_REGISTRY.register(Box::new(SEARCH_REQUESTS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SEARCH_LATENCY.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(SUGGESTION_FAILURES.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(CACHE_LOOKUPS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(BACKEND_REQUESTS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(BACKEND_RETRIES.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(CONNECTION_STATE.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(ANALYTICS_DROPPED.clone()))?;

    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}
