//! # CephUser Reconcile
//!
//! Entry point called by the controller runtime for each CephUser trigger.

use crate::controller::cephuser::UserPhase;
use crate::controller::types::{resource_key, Reconciler, ReconcilerError};
use crate::crd::CephUser;
use crate::observability::metrics;
use crate::runtime::error_policy::schedule_retry;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, Instrument};

pub const KIND: &str = "CephUser";

/// Reconcile one CephUser under the configured deadline
///
/// When the deadline passes the engine future is dropped, which aborts any
/// remote call still in flight. Failures are written to the record's status
/// before being handed to the error policy.
pub async fn reconcile(obj: Arc<CephUser>, ctx: Arc<Reconciler>) -> Result<Action, ReconcilerError> {
    let name = obj.name_any();
    let span = info_span!(
        "cephuser.reconcile",
        resource.name = name.as_str(),
        user.uid = obj.spec.for_provider.uid.as_str(),
        backend = obj.spec.provider_config_ref.name.as_str(),
    );

    async move {
        metrics::increment_reconciliations(KIND);
        let start = Instant::now();
        let deadline = ctx.config.reconcile_timeout();

        let result = match tokio::time::timeout(deadline, ctx.users.reconcile(&obj)).await {
            Ok(result) => result,
            Err(_) => Err(ReconcilerError::Timeout {
                seconds: deadline.as_secs(),
            }),
        };
        metrics::observe_reconciliation_duration(KIND, start.elapsed().as_secs_f64());

        match result {
            Ok(phase) => {
                let key = resource_key(KIND, &name);
                info!(phase = phase.as_str(), "Reconciled CephUser");
                if phase == UserPhase::Absent {
                    ctx.forget_backoff(&key);
                    Ok(Action::await_change())
                } else {
                    ctx.reset_backoff(&key);
                    Ok(Action::requeue(ctx.config.poll_interval()))
                }
            }
            Err(e) => {
                error!(reason = e.reason(), error = %e, "CephUser reconciliation failed");
                metrics::increment_reconciliation_errors(KIND, e.reason());
                let retry_in = schedule_retry(KIND, &name, &e, &ctx);
                ctx.users.record_failure(&obj, &e, retry_in).await;
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}
