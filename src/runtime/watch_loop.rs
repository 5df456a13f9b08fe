//! # Watch Loop
//!
//! Runs one `kube_runtime::Controller` per managed kind. The controller runtime
//! guarantees at most one in-flight reconciliation per object; retries are
//! requeues, never loops inside a reconciliation.
//!
//! Every trigger passes through `trigger_for` first, so status-only updates
//! (including the controller's own status writes) do not cause work.

use crate::controller::server::ServerState;
use crate::controller::types::{Reconciler, ReconcilerError};
use crate::controller::{bucket, cephuser};
use crate::crd::{Bucket, CephUser, ManagedStatus};
use crate::runtime::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::Api;
use kube::{Client, ResourceExt};
use kube_runtime::controller::{self, Action};
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Tolerance when comparing `nextReconcileTime` with the clock
const SCHEDULE_TOLERANCE_SECS: i64 = 2;

/// Delay before handling the next stream error after an auth or throttle failure
const WATCH_RESTART_DELAY: Duration = Duration::from_secs(5);

/// Why a trigger leads to a reconciliation, or how long until one is due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// First reconciliation or the spec changed since the last one
    SpecChanged,
    Deleting,
    /// `nextReconcileTime` has passed
    Periodic,
    /// Nothing changed; the next poll is due after `remaining`
    Skip { remaining: Duration },
}

/// Decide whether an object needs reconciling now
#[must_use]
pub fn trigger_for(meta: &ObjectMeta, status: Option<&ManagedStatus>, now: DateTime<Utc>) -> Trigger {
    if meta.deletion_timestamp.is_some() {
        return Trigger::Deleting;
    }

    let generation = meta.generation.unwrap_or(0);
    let observed = status.and_then(|s| s.observed_generation).unwrap_or(0);
    if observed == 0 || generation != observed {
        return Trigger::SpecChanged;
    }

    let next = status
        .and_then(|s| s.next_reconcile_time.as_deref())
        .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
        .map(|t| t.with_timezone(&Utc));
    match next {
        Some(next) if now < next - chrono::Duration::seconds(SCHEDULE_TOLERANCE_SECS) => {
            Trigger::Skip {
                remaining: (next - now).to_std().unwrap_or(Duration::from_secs(1)),
            }
        }
        // No schedule recorded or the schedule is due
        _ => Trigger::Periodic,
    }
}

async fn reconcile_user(obj: Arc<CephUser>, ctx: Arc<Reconciler>) -> Result<Action, ReconcilerError> {
    match trigger_for(&obj.metadata, obj.status.as_ref(), Utc::now()) {
        Trigger::Skip { remaining } => {
            debug!(
                resource.name = obj.name_any().as_str(),
                remaining_secs = remaining.as_secs(),
                "Skipping CephUser, only status changed"
            );
            Ok(Action::requeue(remaining))
        }
        trigger => {
            debug!(resource.name = obj.name_any().as_str(), trigger = ?trigger, "watch.event.received");
            cephuser::reconcile(obj, ctx).await
        }
    }
}

async fn reconcile_bucket(obj: Arc<Bucket>, ctx: Arc<Reconciler>) -> Result<Action, ReconcilerError> {
    match trigger_for(&obj.metadata, obj.status.as_ref(), Utc::now()) {
        Trigger::Skip { remaining } => {
            debug!(
                resource.name = obj.name_any().as_str(),
                remaining_secs = remaining.as_secs(),
                "Skipping Bucket, only status changed"
            );
            Ok(Action::requeue(remaining))
        }
        trigger => {
            debug!(resource.name = obj.name_any().as_str(), trigger = ?trigger, "watch.event.received");
            bucket::reconcile(obj, ctx).await
        }
    }
}

fn user_error_policy(obj: Arc<CephUser>, error: &ReconcilerError, ctx: Arc<Reconciler>) -> Action {
    handle_reconciliation_error(cephuser::KIND, &obj.name_any(), error, &ctx)
}

fn bucket_error_policy(obj: Arc<Bucket>, error: &ReconcilerError, ctx: Arc<Reconciler>) -> Action {
    handle_reconciliation_error(bucket::KIND, &obj.name_any(), error, &ctx)
}

fn controller_config(reconciler: &Reconciler) -> controller::Config {
    controller::Config::default().concurrency(reconciler.config.max_concurrent_reconciliations)
}

/// Run the CephUser and Bucket controllers until a shutdown signal arrives
///
/// The server reports ready while the controllers run.
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
) -> Result<(), anyhow::Error> {
    let users: Api<CephUser> = Api::all(client.clone());
    let buckets: Api<Bucket> = Api::all(client);

    info!("Starting controller watch loops...");

    let user_controller = Controller::new(users, watcher::Config::default().any_semantic())
        .with_config(controller_config(&reconciler))
        .shutdown_on_signal()
        .run(reconcile_user, user_error_policy, Arc::clone(&reconciler))
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(resource.name = object.name.as_str(), "watch.event.reconciled"),
                Err(e) => {
                    handle_watch_stream_error(cephuser::KIND, &e.to_string(), WATCH_RESTART_DELAY)
                        .await;
                }
            }
        });

    let bucket_controller = Controller::new(buckets, watcher::Config::default().any_semantic())
        .with_config(controller_config(&reconciler))
        .shutdown_on_signal()
        .run(reconcile_bucket, bucket_error_policy, Arc::clone(&reconciler))
        .for_each(|result| async move {
            match result {
                Ok((object, _)) => debug!(resource.name = object.name.as_str(), "watch.event.reconciled"),
                Err(e) => {
                    handle_watch_stream_error(bucket::KIND, &e.to_string(), WATCH_RESTART_DELAY)
                        .await;
                }
            }
        });

    server_state.set_ready(true);
    info!("Controllers running");

    futures::future::join(user_controller, bucket_controller).await;

    server_state.set_ready(false);
    info!("Controllers stopped gracefully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(generation: i64) -> ObjectMeta {
        ObjectMeta {
            name: Some("alice".to_string()),
            generation: Some(generation),
            ..ObjectMeta::default()
        }
    }

    fn status(observed: i64, next: Option<DateTime<Utc>>) -> ManagedStatus {
        ManagedStatus {
            observed_generation: Some(observed),
            next_reconcile_time: next.map(|t| t.to_rfc3339()),
            ..ManagedStatus::default()
        }
    }

    #[test]
    fn test_first_reconcile_runs() {
        assert_eq!(trigger_for(&meta(1), None, Utc::now()), Trigger::SpecChanged);
    }

    #[test]
    fn test_spec_change_runs() {
        let now = Utc::now();
        let later = now + chrono::Duration::seconds(60);
        assert_eq!(
            trigger_for(&meta(3), Some(&status(2, Some(later))), now),
            Trigger::SpecChanged
        );
    }

    #[test]
    fn test_status_only_change_is_skipped_until_due() {
        let now = Utc::now();
        let later = now + chrono::Duration::seconds(60);
        match trigger_for(&meta(2), Some(&status(2, Some(later))), now) {
            Trigger::Skip { remaining } => assert_eq!(remaining.as_secs(), 60),
            other => panic!("expected skip, got {other:?}"),
        }
    }

    #[test]
    fn test_due_schedule_runs() {
        let now = Utc::now();
        let almost = now + chrono::Duration::seconds(1);
        assert_eq!(
            trigger_for(&meta(2), Some(&status(2, Some(almost))), now),
            Trigger::Periodic
        );
        assert_eq!(trigger_for(&meta(2), Some(&status(2, None)), now), Trigger::Periodic);
    }

    #[test]
    fn test_deletion_always_runs() {
        let deleting: ObjectMeta = serde_json::from_value(serde_json::json!({
            "name": "alice",
            "generation": 2,
            "deletionTimestamp": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        let later = Utc::now() + chrono::Duration::seconds(60);
        assert_eq!(
            trigger_for(&deleting, Some(&status(2, Some(later))), Utc::now()),
            Trigger::Deleting
        );
    }
}
