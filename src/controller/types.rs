//! # Types
//!
//! Shared context and error type of the CephUser and Bucket controllers.

use crate::backend::BackendError;
use crate::config::ControllerConfig;
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::bucket::BucketEngine;
use crate::controller::cephuser::CephUserEngine;
use crate::credentials::CredentialsError;
use crate::radosgw::AdminError;
use crate::registry::RegistryError;
use crate::s3::S3Error;
use std::collections::HashMap;
use std::error::Error as StdError;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

type BoxError = Box<dyn StdError + Send + Sync>;

/// Failure of one reconciliation
///
/// The variant decides how the failure is surfaced: its `reason()` lands on
/// the Ready condition and its retryability picks the requeue delay.
#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// The user still owns buckets; the finalizer stays until they are gone
    #[error("user '{uid}' still owns {} bucket(s): {}", .buckets.len(), .buckets.join(", "))]
    DependencyInUse { uid: String, buckets: Vec<String> },

    /// Backend, vault or network failure; the next attempt may succeed
    #[error("{context}: {source}")]
    Transient {
        context: &'static str,
        #[source]
        source: BoxError,
    },

    /// Misconfiguration that will fail the same way until the spec changes
    #[error("{context}: {source}")]
    Configuration {
        context: &'static str,
        #[source]
        source: BoxError,
    },

    /// The remote user exists but its keys are neither recorded nor stored
    #[error("user '{uid}' exists on the backend but no credentials are recorded or stored for it")]
    ManualInterventionRequired { uid: String },

    #[error("reconciliation did not finish within {seconds}s")]
    Timeout { seconds: u64 },

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),
}

impl ReconcilerError {
    fn classify(context: &'static str, source: BoxError, retryable: bool) -> Self {
        if retryable {
            ReconcilerError::Transient { context, source }
        } else {
            ReconcilerError::Configuration { context, source }
        }
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            ReconcilerError::DependencyInUse { .. }
            | ReconcilerError::Transient { .. }
            | ReconcilerError::Timeout { .. }
            | ReconcilerError::Kube(_) => true,
            ReconcilerError::Configuration { .. }
            | ReconcilerError::ManualInterventionRequired { .. } => false,
        }
    }

    /// Whether the failure came from rejected backend or vault credentials
    ///
    /// A cached backend connection holding those credentials is stale and
    /// has to be rebuilt before a retry can succeed.
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        let source = match self {
            ReconcilerError::Transient { source, .. }
            | ReconcilerError::Configuration { source, .. } => source.as_ref(),
            _ => return false,
        };
        if let Some(e) = source.downcast_ref::<AdminError>() {
            e.is_auth_failure()
        } else if let Some(e) = source.downcast_ref::<CredentialsError>() {
            e.is_auth_failure()
        } else if let Some(e) = source.downcast_ref::<BackendError>() {
            e.is_auth_failure()
        } else if let Some(e) = source.downcast_ref::<RegistryError>() {
            e.is_auth_failure()
        } else {
            false
        }
    }

    /// Reason recorded on the Ready condition and the error metric
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcilerError::DependencyInUse { .. } => "DependencyInUse",
            ReconcilerError::Transient { .. } => "Transient",
            ReconcilerError::Configuration { .. } => "ConfigurationError",
            ReconcilerError::ManualInterventionRequired { .. } => "ManualInterventionRequired",
            ReconcilerError::Timeout { .. } => "Timeout",
            ReconcilerError::Kube(_) => "KubernetesError",
        }
    }
}

impl From<AdminError> for ReconcilerError {
    fn from(e: AdminError) -> Self {
        let retryable = e.is_retryable();
        Self::classify("admin API", Box::new(e), retryable)
    }
}

impl From<CredentialsError> for ReconcilerError {
    fn from(e: CredentialsError) -> Self {
        let retryable = e.is_retryable();
        Self::classify("credential store", Box::new(e), retryable)
    }
}

impl From<BackendError> for ReconcilerError {
    fn from(e: BackendError) -> Self {
        let retryable = e.is_retryable();
        Self::classify("backend connection", Box::new(e), retryable)
    }
}

impl From<RegistryError> for ReconcilerError {
    fn from(e: RegistryError) -> Self {
        let retryable = e.is_retryable();
        Self::classify("client registry", Box::new(e), retryable)
    }
}

impl From<S3Error> for ReconcilerError {
    fn from(e: S3Error) -> Self {
        Self::classify("S3", Box::new(e), true)
    }
}

/// Backoff state of one resource
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
    /// Delay already written to the record's status, consumed by the error policy
    pub pending: Option<Duration>,
}

impl BackoffState {
    #[must_use]
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            backoff: FibonacciBackoff::from_config(config),
            error_count: 0,
            pending: None,
        }
    }

    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.error_count = 0;
        self.pending = None;
        self.backoff.reset();
    }
}

/// Context handed to every reconciliation
pub struct Reconciler {
    pub users: CephUserEngine,
    pub buckets: BucketEngine,
    pub config: ControllerConfig,
    /// Backoff state per resource, keyed by `<kind>/<name>`
    pub backoff_states: Arc<Mutex<HashMap<String, BackoffState>>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(users: CephUserEngine, buckets: BucketEngine, config: ControllerConfig) -> Self {
        Self {
            users,
            buckets,
            config,
            backoff_states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Clear the backoff of a resource after a successful reconciliation
    pub fn reset_backoff(&self, key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(key) {
                state.reset();
            }
        }
    }

    /// Drop the backoff of a resource that no longer exists
    pub fn forget_backoff(&self, key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            states.remove(key);
        }
    }
}

/// Key of a cluster-scoped resource in the backoff map
#[must_use]
pub fn resource_key(kind: &str, name: &str) -> String {
    format!("{kind}/{name}")
}
