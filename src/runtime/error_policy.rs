//! # Error Policy
//!
//! Requeue delays for failed reconciliations and classification of watch
//! stream errors.

use crate::controller::types::{resource_key, BackoffState, Reconciler, ReconcilerError};
use kube_runtime::controller::Action;
use std::time::Duration;
use tracing::{error, info, warn};

/// Advance the backoff of `kind/name` after a failure and return the delay
///
/// Retryable failures walk the resource's Fibonacci sequence. Failures no
/// retry will fix on its own (configuration, manual intervention) wait the
/// capped delay so a corrected spec or stored key is still picked up. The
/// delay is kept until the error policy consumes it.
pub fn schedule_retry(kind: &str, name: &str, error: &ReconcilerError, ctx: &Reconciler) -> Duration {
    let key = resource_key(kind, name);
    match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states
                .entry(key)
                .or_insert_with(|| BackoffState::new(&ctx.config));
            state.increment_error();
            let delay = if error.is_retryable() {
                state.backoff.next_backoff()
            } else {
                state.backoff.max_backoff()
            };
            state.pending = Some(delay);
            delay
        }
        Err(e) => {
            warn!(resource = key.as_str(), error = %e, "Failed to lock backoff states, using default backoff");
            DEFAULT_RETRY
        }
    }
}

const DEFAULT_RETRY: Duration = Duration::from_secs(60);

/// Requeue action for a failed reconciliation of `kind/name`
///
/// Uses the delay scheduled when the failure was recorded, advancing the
/// backoff only if none is pending.
pub fn handle_reconciliation_error(
    kind: &str,
    name: &str,
    error: &ReconcilerError,
    ctx: &Reconciler,
) -> Action {
    let key = resource_key(kind, name);

    let pending = match ctx.backoff_states.lock() {
        Ok(mut states) => states.get_mut(&key).and_then(|s| s.pending.take()),
        Err(_) => None,
    };
    let delay = pending.unwrap_or_else(|| schedule_retry(kind, name, error, ctx));
    let error_count = ctx
        .backoff_states
        .lock()
        .ok()
        .and_then(|states| states.get(&key).map(|s| s.error_count))
        .unwrap_or(0);

    let next_retry = chrono::Duration::from_std(delay)
        .ok()
        .map(|d| (chrono::Utc::now() + d).to_rfc3339())
        .unwrap_or_default();

    error!(
        resource = key.as_str(),
        reason = error.reason(),
        retryable = error.is_retryable(),
        "Reconciliation error: {}",
        error
    );
    info!(
        resource = key.as_str(),
        error_count,
        next_retry = next_retry.as_str(),
        "Retrying in {}s",
        delay.as_secs()
    );

    Action::requeue(delay)
}

/// How the watch loop reacts to a controller stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorClass {
    /// RBAC revoked or token expired
    Unauthorized,
    /// Resource version too old, the watcher relists on its own
    Expired,
    /// API server storage is reinitializing
    Throttled,
    /// CRD missing or object deleted mid-flight
    NotFound,
    Other,
}

/// Classify a controller stream error by its rendered text
#[must_use]
pub fn classify_watch_error(error: &str) -> WatchErrorClass {
    // 404 first: a plain-text 404 body surfaces inside a "WatchFailed" chain
    let not_found =
        error.contains("ObjectNotFound") || error.contains("404") || error.contains("not found");
    if not_found {
        WatchErrorClass::NotFound
    } else if error.contains("401") || error.contains("Unauthorized") {
        WatchErrorClass::Unauthorized
    } else if error.contains("410") || error.contains("too old resource version") || error.contains("Gone")
    {
        WatchErrorClass::Expired
    } else if error.contains("429") || error.contains("TooManyRequests") {
        WatchErrorClass::Throttled
    } else {
        WatchErrorClass::Other
    }
}

/// Log a controller stream error and wait out the delay its class calls for
pub async fn handle_watch_stream_error(kind: &str, error: &str, restart_delay: Duration) {
    match classify_watch_error(error) {
        WatchErrorClass::Unauthorized => {
            error!(
                kind,
                "Watch authentication failed (401); check the controller's ClusterRole and ServiceAccount token"
            );
            tokio::time::sleep(restart_delay).await;
        }
        WatchErrorClass::Expired => {
            warn!(kind, "Watch resource version expired (410), watcher will relist");
        }
        WatchErrorClass::Throttled => {
            warn!(kind, "API server throttling watch (429), backing off");
            tokio::time::sleep(restart_delay).await;
        }
        WatchErrorClass::NotFound => {
            warn!(kind, error, "Watched resource not found (404); is the CRD installed?");
        }
        WatchErrorClass::Other => {
            error!(kind, error, "Controller stream error");
        }
    }
}
