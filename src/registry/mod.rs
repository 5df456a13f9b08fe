//! # Client Registry
//!
//! Concurrent cache of ready-to-use S3 clients keyed by CephUser uid.
//!
//! Entries are derived data: each one can be rebuilt from a CephUser and its
//! stored credential pair. Lookups take the shared lock, mutations take the
//! exclusive lock, and no lock is held across a remote call.
//!
//! Every `delete` bumps an eviction counter. A client built on a miss is only
//! cached when no eviction happened while it was being built, so a build that
//! races the delete of its user cannot bring the entry back.
//!
//! The registry is warmed at startup by `init`, which loads every known
//! CephUser with bounded concurrency. A record that fails to load is reported
//! and skipped; it never aborts the pass.

mod factory;

pub use factory::{BackendClientFactory, ClientFactory};

use crate::backend::BackendError;
use crate::constants::REGISTRY_START_CAPACITY;
use crate::credentials::CredentialsError;
use crate::crd::CephUser;
use crate::observability::metrics;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no credentials stored for user '{uid}'")]
    MissingCredentials { uid: String },

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Credentials(#[from] CredentialsError),
}

impl RegistryError {
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            // The owning CephUser may not have finished its create yet
            RegistryError::MissingCredentials { .. } => true,
            RegistryError::Backend(e) => e.is_retryable(),
            RegistryError::Credentials(e) => e.is_retryable(),
        }
    }

    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        match self {
            RegistryError::MissingCredentials { .. } => false,
            RegistryError::Backend(e) => e.is_auth_failure(),
            RegistryError::Credentials(e) => e.is_auth_failure(),
        }
    }
}

/// One cached client
#[derive(Debug, Clone)]
pub struct RegistryEntry<C> {
    pub uid: String,
    pub client: C,
    pub created_at: DateTime<Utc>,
}

/// A record the warm-up pass could not load
#[derive(Debug, Clone)]
pub struct InitFailure {
    pub uid: String,
    pub error: String,
}

/// Outcome of a warm-up pass
#[derive(Debug, Clone, Default)]
pub struct InitReport {
    /// Uids now present in the registry
    pub loaded: Vec<String>,
    /// Records with no credentials yet (not created by the controller)
    pub skipped: Vec<String>,
    pub failed: Vec<InitFailure>,
}

impl InitReport {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Concurrent uid → client map
#[derive(Debug)]
pub struct ClientRegistry<C = aws_sdk_s3::Client> {
    entries: RwLock<HashMap<String, RegistryEntry<C>>>,
    /// Number of deletes so far; only changed under the write lock
    evictions: AtomicU64,
}

impl<C> Default for ClientRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> ClientRegistry<C> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::with_capacity(REGISTRY_START_CAPACITY)),
            evictions: AtomicU64::new(0),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn contains(&self, uid: &str) -> bool {
        self.entries.read().await.contains_key(uid)
    }

    /// Insert or replace the client for `uid`; returns true when an entry was replaced
    pub async fn insert(&self, uid: &str, client: C) -> bool {
        let mut entries = self.entries.write().await;
        Self::store(&mut entries, uid, client)
    }

    /// Insert unless a delete ran since `epoch` was read; returns true when stored
    async fn insert_unless_evicted(&self, uid: &str, client: C, epoch: u64) -> bool {
        let mut entries = self.entries.write().await;
        if self.evictions.load(Ordering::Acquire) != epoch {
            return false;
        }
        Self::store(&mut entries, uid, client);
        true
    }

    fn store(entries: &mut HashMap<String, RegistryEntry<C>>, uid: &str, client: C) -> bool {
        let entry = RegistryEntry {
            uid: uid.to_string(),
            client,
            created_at: Utc::now(),
        };
        let replaced = entries.insert(uid.to_string(), entry).is_some();
        metrics::set_client_registry_entries(entries.len());
        debug!(user.uid = uid, replaced, "Registered client");
        replaced
    }

    /// Remove the entry for `uid`; returns true when one was present
    pub async fn delete(&self, uid: &str) -> bool {
        let (removed, size) = {
            let mut entries = self.entries.write().await;
            self.evictions.fetch_add(1, Ordering::AcqRel);
            let removed = entries.remove(uid).is_some();
            (removed, entries.len())
        };
        metrics::set_client_registry_entries(size);
        if removed {
            debug!(user.uid = uid, "Evicted client");
        }
        removed
    }
}

impl<C: Clone + Send + Sync + 'static> ClientRegistry<C> {
    /// The cached client for `uid`; `None` is an ordinary miss
    pub async fn get_by_uid(&self, uid: &str) -> Option<C> {
        self.entries
            .read()
            .await
            .get(uid)
            .map(|entry| entry.client.clone())
    }

    /// The full entry for `uid`, including its creation time
    pub async fn entry(&self, uid: &str) -> Option<RegistryEntry<C>> {
        self.entries.read().await.get(uid).cloned()
    }

    /// The cached client for the record's uid, building and inserting it on a miss
    ///
    /// The built client is always returned, but it is not cached when the
    /// registry saw a delete while the build was in flight.
    pub async fn get_or_build(
        &self,
        record: &CephUser,
        factory: &dyn ClientFactory<C>,
    ) -> Result<C, RegistryError> {
        let uid = record.spec.for_provider.uid.as_str();
        let epoch = {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(uid) {
                return Ok(entry.client.clone());
            }
            self.evictions.load(Ordering::Acquire)
        };
        let client = factory.build(record).await?;
        if !self.insert_unless_evicted(uid, client.clone(), epoch).await {
            debug!(user.uid = uid, "Registry changed during build, client not cached");
        }
        Ok(client)
    }

    /// Warm the registry from `records`, at most `concurrency` builds at a time
    ///
    /// Records without a `credentialsRef` have not been created by the
    /// controller and are skipped. Every other record either lands in the
    /// registry or in the report's failures.
    pub async fn init(
        &self,
        records: Vec<CephUser>,
        factory: &dyn ClientFactory<C>,
        concurrency: usize,
    ) -> InitReport {
        let mut report = InitReport::default();
        let total = records.len();

        let (ready, pending): (Vec<_>, Vec<_>) = records
            .into_iter()
            .partition(|r| r.spec.credentials_ref.is_some());
        report.skipped = pending
            .into_iter()
            .map(|r| r.spec.for_provider.uid)
            .collect();

        let results: Vec<(String, Result<C, RegistryError>)> = stream::iter(ready)
            .map(|record| async move {
                let uid = record.spec.for_provider.uid.clone();
                let result = factory.build(&record).await;
                (uid, result)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        for (uid, result) in results {
            match result {
                Ok(client) => {
                    self.insert(&uid, client).await;
                    report.loaded.push(uid);
                }
                Err(e) => {
                    warn!(user.uid = uid.as_str(), error = %e, "Failed to load client into registry");
                    report.failed.push(InitFailure {
                        uid,
                        error: e.to_string(),
                    });
                }
            }
        }

        metrics::increment_client_registry_init_failures(report.failed.len());
        info!(
            total,
            loaded = report.loaded.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Client registry warm-up finished"
        );
        report
    }
}
