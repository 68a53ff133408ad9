//! Ambient Prometheus counters for request volume, backend call outcomes, and request latency.

use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, IntCounterVec, Opts};

lazy_static! {
    /// Requests served, labeled by route and outcome status.
    pub static ref REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("weeder_requests_total", "Total requests handled by route and status"),
        &["route", "status"]
    )
    .expect("metric names are valid");

    /// Backend calls made, labeled by role and outcome.
    pub static ref BACKEND_CALLS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("weeder_backend_calls_total", "Backend calls made, by role and outcome"),
        &["role", "outcome"]
    )
    .expect("metric names are valid");

    /// Request handling latency in seconds, labeled by route.
    pub static ref REQUEST_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new("weeder_request_duration_seconds", "Request handling latency")
    )
    .expect("metric options are valid");
}

/// Registers all counters into the default Prometheus registry. Call once at startup.
pub fn register() {
    let registry = prometheus::default_registry();
    let _ = registry.register(Box::new(REQUESTS_TOTAL.clone()));
    let _ = registry.register(Box::new(BACKEND_CALLS_TOTAL.clone()));
    let _ = registry.register(Box::new(REQUEST_DURATION.clone()));
}
