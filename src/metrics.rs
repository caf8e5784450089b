// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Prometheus metrics for the Fabrica toolkit.
//!
//! This module provides comprehensive metrics collection with the namespace
//! prefix `fabrica_`.
//!
//! # Metrics Categories
//!
//! - **Reconciliation Metrics** - Track reconciliation operations and their outcomes
//! - **Resource Lifecycle Metrics** - Track resource creation, updates, and deletions
//! - **Event Bus Metrics** - Track publish/overflow/delivery-failure counts
//! - **HTTP Metrics** - Track request counts and latency by route
//! - **Error Metrics** - Track error conditions and types
//!
//! # Example
//!
//! ```rust,no_run
//! use fabrica::metrics::record_reconciliation_success;
//!
//! record_reconciliation_success("Device", std::time::Duration::from_secs(1));
//! ```

use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder,
};
use std::sync::LazyLock;
use std::time::Duration;

// ============================================================================
// Metric Name Constants
// ============================================================================

/// Namespace prefix for all Fabrica metrics.
const METRICS_NAMESPACE: &str = "fabrica";

// ============================================================================
// Global Metrics Registry
// ============================================================================

/// Global Prometheus metrics registry, exposed via the configured metrics path.
pub static METRICS_REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// ============================================================================
// Reconciliation Metrics
// ============================================================================

/// Total number of reconciliations by kind and outcome.
///
/// Labels:
/// - `kind`: Resource kind (e.g. `Device`)
/// - `status`: Outcome (`success`, `error`, `requeue`)
pub static RECONCILIATION_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_reconciliations_total"),
        "Total number of reconciliations by kind and status",
    );
    let counter = CounterVec::new(opts, &["kind", "status"]).unwrap();
    METRICS_REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Duration of reconciliations in seconds, by kind.
pub static RECONCILIATION_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_reconciliation_duration_seconds"),
        "Duration of reconciliations in seconds by kind",
    )
    .buckets(vec![0.001, 0.01, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0]);
    let histogram = HistogramVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY.register(Box::new(histogram.clone())).unwrap();
    histogram
});

/// Total number of requeue operations, by kind and reason.
pub static REQUEUE_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_requeues_total"),
        "Total number of requeue operations by kind and reason",
    );
    let counter = CounterVec::new(opts, &["kind", "reason"]).unwrap();
    METRICS_REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Lag between spec generation change and controller observation, by kind.
pub static GENERATION_OBSERVATION_LAG_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_generation_observation_lag_seconds"),
        "Lag between spec generation change and controller observation",
    )
    .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]);
    let histogram = HistogramVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY.register(Box::new(histogram.clone())).unwrap();
    histogram
});

// ============================================================================
// Resource Lifecycle Metrics
// ============================================================================

/// Total number of resources created, by kind.
pub static RESOURCES_CREATED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_resources_created_total"),
        "Total number of resources created by kind",
    );
    let counter = CounterVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Total number of resources updated, by kind.
pub static RESOURCES_UPDATED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_resources_updated_total"),
        "Total number of resources updated by kind",
    );
    let counter = CounterVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Total number of resources deleted, by kind.
pub static RESOURCES_DELETED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_resources_deleted_total"),
        "Total number of resources deleted by kind",
    );
    let counter = CounterVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Number of currently active (non-deleted) resources, by kind.
pub static RESOURCES_ACTIVE: LazyLock<GaugeVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_resources_active"),
        "Number of currently active resources by kind",
    );
    let gauge = GaugeVec::new(opts, &["kind"]).unwrap();
    METRICS_REGISTRY.register(Box::new(gauge.clone())).unwrap();
    gauge
});

// ============================================================================
// Event Bus Metrics
// ============================================================================

/// Total number of events published, by event type.
pub static EVENTS_PUBLISHED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_events_published_total"),
        "Total number of CloudEvents published by type",
    );
    let counter = CounterVec::new(opts, &["event_type"]).unwrap();
    METRICS_REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Total number of events dropped due to ring-buffer overflow.
pub static EVENTS_OVERFLOW_TOTAL: LazyLock<prometheus::Counter> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_events_overflow_total"),
        "Total number of events dropped because the bus's ring buffer was full",
    );
    let counter = prometheus::Counter::with_opts(opts).unwrap();
    METRICS_REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Total number of subscriber handler failures, by event type.
pub static EVENT_HANDLER_FAILURES_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_event_handler_failures_total"),
        "Total number of event handler invocations that returned an error",
    );
    let counter = CounterVec::new(opts, &["event_type"]).unwrap();
    METRICS_REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Total number of HTTP requests, by method, route, and status code.
pub static HTTP_REQUESTS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_http_requests_total"),
        "Total number of HTTP requests by method, route, and status",
    );
    let counter = CounterVec::new(opts, &["method", "route", "status"]).unwrap();
    METRICS_REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

/// Duration of HTTP requests in seconds, by method and route.
pub static HTTP_REQUEST_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let opts = HistogramOpts::new(
        format!("{METRICS_NAMESPACE}_http_request_duration_seconds"),
        "Duration of HTTP requests in seconds by method and route",
    )
    .buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]);
    let histogram = HistogramVec::new(opts, &["method", "route"]).unwrap();
    METRICS_REGISTRY.register(Box::new(histogram.clone())).unwrap();
    histogram
});

// ============================================================================
// Error Metrics
// ============================================================================

/// Total number of errors by kind and error category.
pub static ERRORS_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new(
        format!("{METRICS_NAMESPACE}_errors_total"),
        "Total number of errors by kind and error category",
    );
    let counter = CounterVec::new(opts, &["kind", "error_type"]).unwrap();
    METRICS_REGISTRY.register(Box::new(counter.clone())).unwrap();
    counter
});

// ============================================================================
// Helper Functions
// ============================================================================

/// Record a successful reconciliation.
pub fn record_reconciliation_success(kind: &str, duration: Duration) {
    RECONCILIATION_TOTAL.with_label_values(&[kind, "success"]).inc();
    RECONCILIATION_DURATION_SECONDS.with_label_values(&[kind]).observe(duration.as_secs_f64());
}

/// Record a failed reconciliation.
pub fn record_reconciliation_error(kind: &str, duration: Duration) {
    RECONCILIATION_TOTAL.with_label_values(&[kind, "error"]).inc();
    RECONCILIATION_DURATION_SECONDS.with_label_values(&[kind]).observe(duration.as_secs_f64());
}

/// Record a reconciliation requeue.
pub fn record_reconciliation_requeue(kind: &str, reason: &str) {
    RECONCILIATION_TOTAL.with_label_values(&[kind, "requeue"]).inc();
    REQUEUE_TOTAL.with_label_values(&[kind, reason]).inc();
}

/// Record generation-observation lag.
pub fn record_generation_lag(kind: &str, lag: Duration) {
    GENERATION_OBSERVATION_LAG_SECONDS.with_label_values(&[kind]).observe(lag.as_secs_f64());
}

/// Record resource creation.
pub fn record_resource_created(kind: &str) {
    RESOURCES_CREATED_TOTAL.with_label_values(&[kind]).inc();
    RESOURCES_ACTIVE.with_label_values(&[kind]).inc();
}

/// Record resource update.
pub fn record_resource_updated(kind: &str) {
    RESOURCES_UPDATED_TOTAL.with_label_values(&[kind]).inc();
}

/// Record resource deletion.
pub fn record_resource_deleted(kind: &str) {
    RESOURCES_DELETED_TOTAL.with_label_values(&[kind]).inc();
    RESOURCES_ACTIVE.with_label_values(&[kind]).dec();
}

/// Record an error.
pub fn record_error(kind: &str, error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[kind, error_type]).inc();
}

/// Record a published event.
pub fn record_event_published(event_type: &str) {
    EVENTS_PUBLISHED_TOTAL.with_label_values(&[event_type]).inc();
}

/// Record a ring-buffer overflow (oldest queued event dropped).
pub fn record_event_overflow() {
    EVENTS_OVERFLOW_TOTAL.inc();
}

/// Record an event handler invocation that returned an error.
pub fn record_event_handler_failure(event_type: &str) {
    EVENT_HANDLER_FAILURES_TOTAL.with_label_values(&[event_type]).inc();
}

/// Record one completed HTTP request.
pub fn record_http_request(method: &str, route: &str, status: u16, duration: Duration) {
    HTTP_REQUESTS_TOTAL.with_label_values(&[method, route, &status.to_string()]).inc();
    HTTP_REQUEST_DURATION_SECONDS.with_label_values(&[method, route]).observe(duration.as_secs_f64());
}

/// Gather and encode all metrics in Prometheus text format.
///
/// # Errors
/// Returns an error if encoding fails.
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = METRICS_REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(format!("UTF-8 error: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_reconciliation_success_updates_counter_and_histogram() {
        let kind = "MetricsTestSuccess";
        record_reconciliation_success(kind, Duration::from_millis(500));

        let counter = RECONCILIATION_TOTAL.with_label_values(&[kind, "success"]);
        assert!(counter.get() > 0.0);
        let histogram = RECONCILIATION_DURATION_SECONDS.with_label_values(&[kind]);
        assert!(histogram.get_sample_count() > 0);
    }

    #[test]
    fn record_reconciliation_error_updates_counter_and_histogram() {
        let kind = "MetricsTestError";
        record_reconciliation_error(kind, Duration::from_millis(250));

        let counter = RECONCILIATION_TOTAL.with_label_values(&[kind, "error"]);
        assert!(counter.get() > 0.0);
    }

    #[test]
    fn record_event_overflow_increments_counter() {
        let before = EVENTS_OVERFLOW_TOTAL.get();
        record_event_overflow();
        assert!(EVENTS_OVERFLOW_TOTAL.get() > before);
    }

    #[test]
    fn record_http_request_updates_counter_and_histogram() {
        record_http_request("GET", "/apis/fabrica/v1/devices", 200, Duration::from_millis(10));
        let counter = HTTP_REQUESTS_TOTAL.with_label_values(&["GET", "/apis/fabrica/v1/devices", "200"]);
        assert!(counter.get() > 0.0);
    }

    #[test]
    fn gather_metrics_includes_namespace_prefix() {
        record_reconciliation_success("GatherTest", Duration::from_millis(100));

        let result = gather_metrics();
        assert!(result.is_ok(), "gathering metrics should succeed");

        let metrics_text = result.unwrap();
        assert!(metrics_text.contains("fabrica_"), "metrics should carry the fabrica_ namespace prefix");
        assert!(metrics_text.contains("reconciliations_total"));
    }
}
