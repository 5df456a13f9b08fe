//! # Bucket Reconcile

use crate::controller::types::{resource_key, Reconciler, ReconcilerError};
use crate::crd::Bucket;
use crate::observability::metrics;
use crate::runtime::error_policy::schedule_retry;
use kube::ResourceExt;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, Instrument};

pub const KIND: &str = "Bucket";

pub async fn reconcile(obj: Arc<Bucket>, ctx: Arc<Reconciler>) -> Result<Action, ReconcilerError> {
    let name = obj.name_any();
    let span = info_span!(
        "bucket.reconcile",
        resource.name = name.as_str(),
        bucket = obj.spec.for_provider.external_bucket_name.as_str(),
        user.uid = obj.spec.for_provider.ceph_user_uid.as_str(),
    );

    async move {
        metrics::increment_reconciliations(KIND);
        let start = Instant::now();
        let deadline = ctx.config.reconcile_timeout();

        let result = match tokio::time::timeout(deadline, ctx.buckets.reconcile(&obj)).await {
            Ok(result) => result,
            Err(_) => Err(ReconcilerError::Timeout {
                seconds: deadline.as_secs(),
            }),
        };
        metrics::observe_reconciliation_duration(KIND, start.elapsed().as_secs_f64());

        match result {
            Ok(()) => {
                let key = resource_key(KIND, &name);
                if obj.metadata.deletion_timestamp.is_some() {
                    ctx.forget_backoff(&key);
                    info!("Bucket released");
                    Ok(Action::await_change())
                } else {
                    ctx.reset_backoff(&key);
                    info!("Reconciled Bucket");
                    Ok(Action::requeue(ctx.config.poll_interval()))
                }
            }
            Err(e) => {
                error!(reason = e.reason(), error = %e, "Bucket reconciliation failed");
                metrics::increment_reconciliation_errors(KIND, e.reason());
                let retry_in = schedule_retry(KIND, &name, &e, &ctx);
                ctx.buckets.record_failure(&obj, &e, retry_in).await;
                Err(e)
            }
        }
    }
    .instrument(span)
    .await
}
