//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `radosgw_reconciliations_total` - Total number of reconciliations by resource kind
//! - `radosgw_reconciliation_errors_total` - Reconciliation errors by resource kind and reason
//! - `radosgw_reconciliation_duration_seconds` - Duration of reconciliation operations
//! - `radosgw_remote_operations_total` - Calls to the admin API, vault and S3 by service and operation
//! - `radosgw_remote_operation_errors_total` - Failed remote calls by service and operation
//! - `radosgw_remote_operation_duration_seconds` - Duration of remote calls
//! - `radosgw_client_registry_entries` - Current number of cached data-plane clients
//! - `radosgw_client_registry_init_failures_total` - Records the warm-up pass could not load

use anyhow::Result;
use prometheus::{HistogramVec, IntCounter, IntCounterVec, IntGauge, Registry};
use std::sync::LazyLock;

pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "radosgw_reconciliations_total",
            "Total number of reconciliations",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "radosgw_reconciliation_errors_total",
            "Total number of reconciliation errors",
        ),
        &["kind", "reason"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "radosgw_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REMOTE_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "radosgw_remote_operations_total",
            "Total number of remote operations by service and operation",
        ),
        &["service", "operation"],
    )
    .expect("Failed to create REMOTE_OPERATIONS_TOTAL metric - this should never happen")
});

static REMOTE_OPERATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "radosgw_remote_operation_errors_total",
            "Total number of failed remote operations by service and operation",
        ),
        &["service", "operation"],
    )
    .expect("Failed to create REMOTE_OPERATION_ERRORS_TOTAL metric - this should never happen")
});

static REMOTE_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "radosgw_remote_operation_duration_seconds",
            "Duration of remote operations in seconds",
        )
        .buckets(vec![0.05, 0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["service", "operation"],
    )
    .expect("Failed to create REMOTE_OPERATION_DURATION metric - this should never happen")
});

static CLIENT_REGISTRY_ENTRIES: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "radosgw_client_registry_entries",
        "Current number of cached data-plane clients",
    )
    .expect("Failed to create CLIENT_REGISTRY_ENTRIES metric - this should never happen")
});

static CLIENT_REGISTRY_INIT_FAILURES_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "radosgw_client_registry_init_failures_total",
        "Total number of records the registry warm-up pass failed to load",
    )
    .expect("Failed to create CLIENT_REGISTRY_INIT_FAILURES_TOTAL metric - this should never happen")
});

pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REMOTE_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REMOTE_OPERATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REMOTE_OPERATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(CLIENT_REGISTRY_ENTRIES.clone()))?;
    REGISTRY.register(Box::new(CLIENT_REGISTRY_INIT_FAILURES_TOTAL.clone()))?;
    Ok(())
}

pub fn increment_reconciliations(kind: &str) {
    RECONCILIATIONS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn increment_reconciliation_errors(kind: &str, reason: &str) {
    RECONCILIATION_ERRORS_TOTAL
        .with_label_values(&[kind, reason])
        .inc();
}

pub fn observe_reconciliation_duration(kind: &str, duration: f64) {
    RECONCILIATION_DURATION
        .with_label_values(&[kind])
        .observe(duration);
}

/// Record a completed remote call (successful or not)
pub fn record_remote_operation(service: &str, operation: &str, duration: f64) {
    REMOTE_OPERATIONS_TOTAL
        .with_label_values(&[service, operation])
        .inc();
    REMOTE_OPERATION_DURATION
        .with_label_values(&[service, operation])
        .observe(duration);
}

pub fn increment_remote_operation_errors(service: &str, operation: &str) {
    REMOTE_OPERATION_ERRORS_TOTAL
        .with_label_values(&[service, operation])
        .inc();
}

pub fn set_client_registry_entries(count: usize) {
    CLIENT_REGISTRY_ENTRIES.set(i64::try_from(count).unwrap_or(i64::MAX));
}

pub fn increment_client_registry_init_failures(count: usize) {
    CLIENT_REGISTRY_INIT_FAILURES_TOTAL.inc_by(u64::try_from(count).unwrap_or(u64::MAX));
}
