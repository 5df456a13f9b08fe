//! # CephUser Engine
//!
//! Per-record state machine converging a CephUser onto its backend.
//!
//! ```text
//! Unknown ──observe──▶ Absent ──create──▶ Creating ──▶ Present
//!                          ▲                              │
//!                          └────────── delete ◀── Removing┘
//! ```
//!
//! Every transition is level-triggered: the engine holds no state between
//! invocations and re-running it with nothing changed ends in the same place.
//! Remote calls within one transition are issued one after the other; the
//! caller bounds the whole reconciliation with a deadline.

use crate::backend::{Backend, BackendResolver};
use crate::constants::CEPHUSER_FINALIZER;
use crate::controller::conditions;
use crate::controller::events::{actions, reasons, EventPublisher};
use crate::controller::records::{has_finalizer, RecordStore};
use crate::controller::types::ReconcilerError;
use crate::credentials::generate_credential_pair;
use crate::crd::{CephUser, Condition, Readiness};
use crate::radosgw::{AdminErrorKind, NewUser};
use crate::registry::ClientRegistry;
use kube::runtime::events::EventType;
use kube::Resource;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lifecycle phase of a CephUser, recorded as `status.phase`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserPhase {
    /// The backend could not be observed
    Unknown,
    Absent,
    Creating,
    Present,
    Removing,
}

impl UserPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UserPhase::Unknown => "Unknown",
            UserPhase::Absent => "Absent",
            UserPhase::Creating => "Creating",
            UserPhase::Present => "Present",
            UserPhase::Removing => "Removing",
        }
    }
}

pub struct CephUserEngine {
    backends: Arc<dyn BackendResolver>,
    records: Arc<dyn RecordStore<CephUser>>,
    events: Arc<dyn EventPublisher>,
    registry: Arc<ClientRegistry>,
    poll_interval: Duration,
}

impl std::fmt::Debug for CephUserEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CephUserEngine")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl CephUserEngine {
    pub fn new(
        backends: Arc<dyn BackendResolver>,
        records: Arc<dyn RecordStore<CephUser>>,
        events: Arc<dyn EventPublisher>,
        registry: Arc<ClientRegistry>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            backends,
            records,
            events,
            registry,
            poll_interval,
        }
    }

    /// Drive `record` one step towards its desired state
    ///
    /// Returns the phase the record ends in. When the backend or vault
    /// rejected the credentials of the cached connection, that connection is
    /// dropped so the retry reconnects with fresh ones.
    pub async fn reconcile(&self, record: &CephUser) -> Result<UserPhase, ReconcilerError> {
        let result = self.converge(record).await;
        if let Err(e) = &result {
            if e.is_auth_failure() {
                let backend = record.spec.provider_config_ref.name.as_str();
                warn!(backend, error = %e, "Credentials rejected, reconnecting on next attempt");
                self.backends.invalidate(backend).await;
            }
        }
        result
    }

    async fn converge(&self, record: &CephUser) -> Result<UserPhase, ReconcilerError> {
        let uid = record.spec.for_provider.uid.as_str();

        if record.meta().deletion_timestamp.is_some() {
            if !has_finalizer(record, CEPHUSER_FINALIZER) {
                debug!(user.uid = uid, "Record is being deleted and holds no finalizer");
                return Ok(UserPhase::Absent);
            }
            let backend = self.resolve(record).await?;
            return self.delete(&backend, record).await;
        }

        let backend = self.resolve(record).await?;
        if !self.observe(&backend, record).await? {
            self.create(&backend, record).await?;
        } else if record.spec.credentials_ref.is_none() {
            self.adopt(&backend, record).await?;
        } else {
            self.update(record).await?;
        }
        Ok(UserPhase::Present)
    }

    async fn resolve(&self, record: &CephUser) -> Result<Arc<Backend>, ReconcilerError> {
        Ok(self
            .backends
            .resolve(&record.spec.provider_config_ref.name)
            .await?)
    }

    /// Whether the remote user exists
    ///
    /// A missing user is `Ok(false)`. Any other failure leaves the state
    /// unknown and is returned so the caller retries; nothing is changed.
    pub async fn observe(&self, backend: &Backend, record: &CephUser) -> Result<bool, ReconcilerError> {
        let uid = record.spec.for_provider.uid.as_str();
        match backend.users.exists(uid).await {
            Ok(exists) => {
                debug!(user.uid = uid, backend = backend.name.as_str(), exists, "Observed user");
                Ok(exists)
            }
            Err(e) => {
                warn!(
                    user.uid = uid,
                    backend = backend.name.as_str(),
                    phase = UserPhase::Unknown.as_str(),
                    error = %e,
                    "Could not observe user"
                );
                Err(e.into())
            }
        }
    }

    /// Create the remote user, apply its quota, persist its keys, then record
    /// the outcome on the CephUser
    ///
    /// A pair already held by the credential store is reused, so a retried
    /// create presents the same keys and the backend answers `KeyExists`.
    pub async fn create(&self, backend: &Backend, record: &CephUser) -> Result<CephUser, ReconcilerError> {
        let params = &record.spec.for_provider;
        let uid = params.uid.as_str();
        info!(
            user.uid = uid,
            backend = backend.name.as_str(),
            phase = UserPhase::Creating.as_str(),
            "Creating user"
        );

        let credentials = match backend.credentials.get(uid).await? {
            Some(stored) => {
                info!(user.uid = uid, "Reusing stored credentials");
                stored
            }
            None => generate_credential_pair(),
        };

        backend
            .users
            .create(&NewUser {
                uid: uid.to_string(),
                display_name: params.displayed_name.clone(),
                credentials: credentials.clone(),
                max_buckets: params.user_quota_max_buckets,
            })
            .await?;

        if let Some(quota) = params.quota() {
            backend.users.set_quota(uid, &quota).await?;
        }

        backend.credentials.put(uid, &credentials).await?;

        let record = self.record_credentials(backend, record).await?;
        let record = self.records.add_finalizer(&record, CEPHUSER_FINALIZER).await?;
        let record = self.mark_ready(&record, "user created").await?;

        self.events
            .publish(
                &record.object_ref(&()),
                EventType::Normal,
                reasons::USER_CREATED,
                actions::CREATE,
                Some(format!("Created user '{uid}' on {}", backend.name)),
            )
            .await;
        Ok(record)
    }

    /// Finish a create that stopped after the remote user was made
    ///
    /// The remote user exists but no `credentialsRef` is recorded. When the
    /// credential store holds a pair for the uid the record adopts it;
    /// otherwise the user may be foreign and an operator has to decide.
    pub async fn adopt(&self, backend: &Backend, record: &CephUser) -> Result<CephUser, ReconcilerError> {
        let uid = record.spec.for_provider.uid.as_str();
        if backend.credentials.get(uid).await?.is_none() {
            warn!(
                user.uid = uid,
                backend = backend.name.as_str(),
                "User exists without recorded or stored credentials"
            );
            return Err(ReconcilerError::ManualInterventionRequired {
                uid: uid.to_string(),
            });
        }

        info!(user.uid = uid, backend = backend.name.as_str(), "Adopting user with stored credentials");
        let record = self.record_credentials(backend, record).await?;
        let record = self.records.add_finalizer(&record, CEPHUSER_FINALIZER).await?;
        let record = self.mark_ready(&record, "user adopted").await?;

        self.events
            .publish(
                &record.object_ref(&()),
                EventType::Normal,
                reasons::USER_ADOPTED,
                actions::ADOPT,
                Some(format!("Recorded stored credentials for existing user '{uid}'")),
            )
            .await;
        Ok(record)
    }

    /// The user exists and is ours; nothing is pushed to the backend
    ///
    /// Quota and display-name edits on an existing user are accepted on the
    /// record but not applied remotely.
    pub async fn update(&self, record: &CephUser) -> Result<CephUser, ReconcilerError> {
        debug!(
            user.uid = record.spec.for_provider.uid.as_str(),
            "User exists; spec changes are not pushed to the backend"
        );
        let record = self.records.add_finalizer(record, CEPHUSER_FINALIZER).await?;
        self.mark_ready(&record, "user exists").await
    }

    /// Remove the user once it owns no buckets
    ///
    /// Order: bucket check, finalizer release, remote removal, credential
    /// erasure, registry eviction. A user that is already gone remotely is not
    /// removed again.
    pub async fn delete(&self, backend: &Backend, record: &CephUser) -> Result<UserPhase, ReconcilerError> {
        let uid = record.spec.for_provider.uid.as_str();
        info!(
            user.uid = uid,
            backend = backend.name.as_str(),
            phase = UserPhase::Removing.as_str(),
            "Removing user"
        );

        let buckets = match backend.users.list_owned_buckets(uid).await {
            Ok(buckets) => buckets,
            Err(e) if e.kind == AdminErrorKind::NoSuchUser => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        if !buckets.is_empty() {
            return Err(ReconcilerError::DependencyInUse {
                uid: uid.to_string(),
                buckets,
            });
        }

        self.records.remove_finalizer(record, CEPHUSER_FINALIZER).await?;

        match backend.users.remove(uid).await {
            Ok(()) => {}
            Err(e) if e.kind == AdminErrorKind::NoSuchUser => {
                debug!(user.uid = uid, "User already absent on the backend");
            }
            Err(e) => return Err(e.into()),
        }

        backend.credentials.delete(uid).await?;
        self.registry.delete(uid).await;

        self.events
            .publish(
                &record.object_ref(&()),
                EventType::Normal,
                reasons::USER_DELETED,
                actions::DELETE,
                Some(format!("Removed user '{uid}' from {}", backend.name)),
            )
            .await;
        Ok(UserPhase::Absent)
    }

    /// Surface a failed reconciliation on the record
    ///
    /// Writes `Ready=False` with the error's reason and the time of the next
    /// attempt, and publishes a warning event. A failed status write is
    /// logged; the original error stands.
    pub async fn record_failure(&self, record: &CephUser, error: &ReconcilerError, retry_in: Duration) {
        let phase = match error {
            ReconcilerError::DependencyInUse { .. } => UserPhase::Removing,
            ReconcilerError::ManualInterventionRequired { .. } => UserPhase::Present,
            _ => UserPhase::Unknown,
        };
        let reason = match error {
            ReconcilerError::DependencyInUse { .. } => reasons::DEPENDENCY_IN_USE,
            ReconcilerError::ManualInterventionRequired { .. } => {
                reasons::MANUAL_INTERVENTION_REQUIRED
            }
            _ => reasons::RECONCILE_FAILED,
        };

        let status = conditions::failed(
            record.status.as_ref(),
            record.meta().generation,
            phase.as_str(),
            Condition::ready(Readiness::Error, error.reason(), error.to_string()),
            retry_in,
        );
        if let Err(e) = self.records.set_status(record, &status).await {
            warn!(
                user.uid = record.spec.for_provider.uid.as_str(),
                error = %e,
                "Failed to record failure on status"
            );
        }

        self.events
            .publish(
                &record.object_ref(&()),
                EventType::Warning,
                reason,
                actions::RECONCILE,
                Some(error.to_string()),
            )
            .await;
    }

    async fn record_credentials(
        &self,
        backend: &Backend,
        record: &CephUser,
    ) -> Result<CephUser, ReconcilerError> {
        let reference = backend
            .credentials
            .reference(&record.spec.for_provider.uid)?;
        if record.spec.credentials_ref.as_ref() == Some(&reference) {
            return Ok(record.clone());
        }
        Ok(self
            .records
            .merge_spec(record, json!({ "credentialsRef": reference }))
            .await?)
    }

    async fn mark_ready(&self, record: &CephUser, message: &str) -> Result<CephUser, ReconcilerError> {
        let status = conditions::succeeded(
            record.status.as_ref(),
            record.meta().generation,
            UserPhase::Present.as_str(),
            Condition::ready(Readiness::Available, "Available", message),
            self.poll_interval,
        );
        Ok(self.records.set_status(record, &status).await?)
    }
}
