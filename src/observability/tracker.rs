//! # Operation Tracker
//!
//! Times a single remote call and records its outcome in the remote-operation
//! metrics and on the caller's span.

use crate::observability::metrics;
use std::time::Instant;
use tracing::{debug, warn, Span};

/// Tracks timing and outcome of one call to the admin API, vault or S3
#[derive(Debug)]
pub struct OperationTracker {
    service: &'static str,
    start: Instant,
    span: Span,
}

impl OperationTracker {
    /// Create a new operation tracker for the given service
    pub fn new(service: &'static str, span: Span) -> Self {
        Self {
            service,
            start: Instant::now(),
            span,
        }
    }

    /// Record success metrics
    pub fn record_success(&self, operation: &str) {
        let elapsed = self.start.elapsed();
        metrics::record_remote_operation(self.service, operation, elapsed.as_secs_f64());
        self.span.in_scope(|| {
            debug!(
                service = self.service,
                operation,
                duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "remote operation succeeded"
            );
        });
    }

    /// Record error metrics
    pub fn record_error(&self, operation: &str, error_message: &str) {
        let elapsed = self.start.elapsed();
        metrics::record_remote_operation(self.service, operation, elapsed.as_secs_f64());
        metrics::increment_remote_operation_errors(self.service, operation);
        self.span.in_scope(|| {
            warn!(
                service = self.service,
                operation,
                duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                error = error_message,
                "remote operation failed"
            );
        });
    }
}
