//! # Kubernetes Events
//!
//! Events recorded on CephUser and Bucket resources, visible through
//! `kubectl describe` and `kubectl get events`.
//!
//! Publishing is fire-and-forget: a failed event is logged and never fails a
//! reconciliation.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Record an event on `resource_ref`
    ///
    /// `reason` is the machine-readable REASON column, `action` what the
    /// controller was doing when it happened.
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    );
}

/// Publisher backed by `kube::runtime::events::Recorder`
pub struct KubeEventPublisher {
    recorder: Recorder,
}

impl std::fmt::Debug for KubeEventPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventPublisher").finish_non_exhaustive()
    }
}

impl KubeEventPublisher {
    /// `controller_name` is reported as the event's reporting component
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: None,
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventPublisher for KubeEventPublisher {
    async fn publish(
        &self,
        resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        action: &str,
        note: Option<String>,
    ) {
        let event = Event {
            type_,
            reason: reason.to_string(),
            note,
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, resource_ref).await {
            warn!(
                reason,
                action,
                resource.name = resource_ref.name.as_deref().unwrap_or_default(),
                error = %e,
                "Failed to publish Kubernetes event"
            );
        }
    }
}

/// Discards every event
#[derive(Debug, Default)]
pub struct NoopEventPublisher;

#[async_trait]
impl EventPublisher for NoopEventPublisher {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        _type_: EventType,
        _reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
    }
}

/// Event reasons (REASON column)
pub mod reasons {
    pub const USER_CREATED: &str = "UserCreated";
    pub const USER_ADOPTED: &str = "UserAdopted";
    pub const USER_DELETED: &str = "UserDeleted";
    pub const QUOTA_APPLIED: &str = "QuotaApplied";
    /// Deletion held back because the user still owns buckets
    pub const DEPENDENCY_IN_USE: &str = "DependencyInUse";
    /// Remote user exists but no credentials are recorded or stored
    pub const MANUAL_INTERVENTION_REQUIRED: &str = "ManualInterventionRequired";
    pub const BUCKET_CREATED: &str = "BucketCreated";
    pub const BUCKET_DELETED: &str = "BucketDeleted";
    pub const RECONCILE_FAILED: &str = "ReconcileFailed";
}

/// Event actions (ACTION column)
pub mod actions {
    pub const RECONCILE: &str = "Reconcile";
    pub const CREATE: &str = "Create";
    pub const ADOPT: &str = "Adopt";
    pub const DELETE: &str = "Delete";
}
