//! Common test utilities
//!
//! In-memory stand-ins for the admin API, credential store, record store and
//! event publisher, plus rustls setup for the contract tests.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::EventType;
use radosgw_user_controller::backend::{Backend, BackendError, BackendResolver};
use radosgw_user_controller::config::ControllerConfig;
use radosgw_user_controller::controller::bucket::{BucketEngine, OwnerLookup};
use radosgw_user_controller::controller::cephuser::CephUserEngine;
use radosgw_user_controller::controller::events::EventPublisher;
use radosgw_user_controller::controller::records::RecordStore;
use radosgw_user_controller::controller::Reconciler;
use radosgw_user_controller::credentials::{CredentialPair, CredentialStore, CredentialsError};
use radosgw_user_controller::crd::{
    Bucket, BucketParameters, BucketSpec, CephUser, CephUserParameters, CephUserSpec,
    CredentialsKind, CredentialsReference, ManagedStatus, ProviderConfigReference,
};
use radosgw_user_controller::radosgw::{
    AdminApi, AdminError, AdminErrorKind, NewUser, RgwUser, UserQuota, UserService,
};
use radosgw_user_controller::registry::{ClientFactory, ClientRegistry, RegistryError};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` to ensure it's only called once per test binary.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        rustls::crypto::ring::default_provider()
            .install_default()
            .expect("Failed to install rustls crypto provider");
    });
}

pub const BACKEND: &str = "ceph-prod1";

/// A user held by `FakeAdmin`
#[derive(Debug, Clone)]
pub struct StoredUser {
    pub display_name: String,
    pub access_key: String,
    pub quota: Option<UserQuota>,
}

/// Admin API over an in-memory user table
///
/// Creating a uid that exists answers `KeyExists` when the same access key is
/// presented and `UserAlreadyExists` otherwise, as the gateway does.
#[derive(Debug, Default)]
pub struct FakeAdmin {
    pub users: Mutex<HashMap<String, StoredUser>>,
    pub buckets: Mutex<HashMap<String, Vec<String>>>,
    /// Operation name → error kind returned on every call
    pub failures: Mutex<HashMap<&'static str, AdminErrorKind>>,
    pub calls: Mutex<Vec<&'static str>>,
    /// Operations that never answer
    pub stalled: Mutex<HashSet<&'static str>>,
    /// Calls currently waiting on a stalled operation
    pub in_flight: Arc<AtomicUsize>,
}

/// Counts one waiting call until dropped
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeAdmin {
    pub fn fail(&self, operation: &'static str, kind: AdminErrorKind) {
        self.failures.lock().unwrap().insert(operation, kind);
    }

    pub fn stall(&self, operation: &'static str) {
        self.stalled.lock().unwrap().insert(operation);
    }

    pub fn waiting(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn heal(&self, operation: &'static str) {
        self.failures.lock().unwrap().remove(operation);
    }

    pub fn add_user(&self, uid: &str, access_key: &str) {
        self.users.lock().unwrap().insert(
            uid.to_string(),
            StoredUser {
                display_name: uid.to_string(),
                access_key: access_key.to_string(),
                quota: None,
            },
        );
    }

    pub fn user(&self, uid: &str) -> Option<StoredUser> {
        self.users.lock().unwrap().get(uid).cloned()
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == operation)
            .count()
    }

    async fn enter(&self, operation: &'static str) -> Result<(), AdminError> {
        self.calls.lock().unwrap().push(operation);
        let stalled = self.stalled.lock().unwrap().contains(operation);
        if stalled {
            let _waiting = InFlight::enter(&self.in_flight);
            std::future::pending::<()>().await;
        }
        let failure = self.failures.lock().unwrap().get(operation).copied();
        match failure {
            Some(kind) => Err(AdminError::new(kind, operation, "injected")),
            None => Ok(()),
        }
    }

    fn no_such_user(operation: &'static str) -> AdminError {
        AdminError::new(AdminErrorKind::NoSuchUser, operation, "NoSuchUser")
    }
}

#[async_trait]
impl AdminApi for FakeAdmin {
    async fn get_user(&self, uid: &str) -> Result<RgwUser, AdminError> {
        self.enter("get_user").await?;
        let users = self.users.lock().unwrap();
        let user = users.get(uid).ok_or_else(|| Self::no_such_user("get_user"))?;
        Ok(RgwUser {
            user_id: uid.to_string(),
            display_name: user.display_name.clone(),
            max_buckets: None,
            suspended: Some(0),
        })
    }

    async fn create_user(&self, user: &NewUser) -> Result<(), AdminError> {
        self.enter("create_user").await?;
        let mut users = self.users.lock().unwrap();
        if let Some(existing) = users.get(&user.uid) {
            let kind = if existing.access_key == user.credentials.access_key() {
                AdminErrorKind::KeyExists
            } else {
                AdminErrorKind::UserAlreadyExists
            };
            return Err(AdminError::new(kind, "create_user", kind.as_str()));
        }
        users.insert(
            user.uid.clone(),
            StoredUser {
                display_name: user.display_name.clone(),
                access_key: user.credentials.access_key().to_string(),
                quota: None,
            },
        );
        Ok(())
    }

    async fn set_user_quota(&self, uid: &str, quota: &UserQuota) -> Result<(), AdminError> {
        self.enter("set_user_quota").await?;
        let mut users = self.users.lock().unwrap();
        let user = users
            .get_mut(uid)
            .ok_or_else(|| Self::no_such_user("set_user_quota"))?;
        user.quota = Some(quota.clone());
        Ok(())
    }

    async fn remove_user(&self, uid: &str) -> Result<(), AdminError> {
        self.enter("remove_user").await?;
        self.users
            .lock()
            .unwrap()
            .remove(uid)
            .map(|_| ())
            .ok_or_else(|| Self::no_such_user("remove_user"))
    }

    async fn list_user_buckets(&self, uid: &str) -> Result<Vec<String>, AdminError> {
        self.enter("list_user_buckets").await?;
        if !self.users.lock().unwrap().contains_key(uid) {
            return Err(Self::no_such_user("list_user_buckets"));
        }
        Ok(self
            .buckets
            .lock()
            .unwrap()
            .get(uid)
            .cloned()
            .unwrap_or_default())
    }
}

/// Credential store over a map, with injectable write failures
#[derive(Debug, Default)]
pub struct FakeCredentials {
    pub pairs: Mutex<HashMap<String, CredentialPair>>,
    /// Number of upcoming `put` calls that fail
    pub failing_puts: Mutex<usize>,
}

impl FakeCredentials {
    pub fn stored(&self, uid: &str) -> Option<CredentialPair> {
        self.pairs.lock().unwrap().get(uid).cloned()
    }

    pub fn seed(&self, uid: &str, pair: CredentialPair) {
        self.pairs.lock().unwrap().insert(uid.to_string(), pair);
    }
}

#[async_trait]
impl CredentialStore for FakeCredentials {
    async fn put(&self, uid: &str, pair: &CredentialPair) -> Result<(), CredentialsError> {
        {
            let mut failing = self.failing_puts.lock().unwrap();
            if *failing > 0 {
                *failing -= 1;
                return Err(CredentialsError::MissingField {
                    field: "data".to_string(),
                    location: format!("injected failure for {uid}"),
                });
            }
        }
        self.pairs
            .lock()
            .unwrap()
            .insert(uid.to_string(), pair.clone());
        Ok(())
    }

    async fn get(&self, uid: &str) -> Result<Option<CredentialPair>, CredentialsError> {
        Ok(self.stored(uid))
    }

    async fn delete(&self, uid: &str) -> Result<(), CredentialsError> {
        self.pairs.lock().unwrap().remove(uid);
        Ok(())
    }

    fn reference(&self, uid: &str) -> Result<CredentialsReference, CredentialsError> {
        Ok(CredentialsReference {
            kind: CredentialsKind::Vault,
            path: Some(format!("radosgw/prod1/users/{uid}")),
            name: None,
            namespace: None,
        })
    }
}

/// Resolves the one configured backend, remembering invalidations
pub struct StaticBackends {
    pub backend: Arc<Backend>,
    pub invalidated: Mutex<Vec<String>>,
}

impl StaticBackends {
    pub fn invalidations(&self) -> Vec<String> {
        self.invalidated.lock().unwrap().clone()
    }
}

#[async_trait]
impl BackendResolver for StaticBackends {
    async fn resolve(&self, provider_config_name: &str) -> Result<Arc<Backend>, BackendError> {
        if provider_config_name == self.backend.name {
            Ok(Arc::clone(&self.backend))
        } else {
            Err(BackendError::ProviderConfigNotFound {
                name: provider_config_name.to_string(),
            })
        }
    }

    async fn invalidate(&self, provider_config_name: &str) {
        self.invalidated
            .lock()
            .unwrap()
            .push(provider_config_name.to_string());
    }
}

/// CephUser records kept in memory, with JSON merge semantics for spec patches
#[derive(Debug, Default)]
pub struct FakeRecords {
    pub records: Mutex<HashMap<String, CephUser>>,
    pub writes: Mutex<Vec<&'static str>>,
}

impl FakeRecords {
    pub fn latest(&self, name: &str) -> Option<CephUser> {
        self.records.lock().unwrap().get(name).cloned()
    }

    fn save(&self, write: &'static str, record: CephUser) -> CephUser {
        self.writes.lock().unwrap().push(write);
        self.records.lock().unwrap().insert(
            record.metadata.name.clone().unwrap_or_default(),
            record.clone(),
        );
        record
    }
}

#[async_trait]
impl RecordStore<CephUser> for FakeRecords {
    async fn add_finalizer(&self, record: &CephUser, finalizer: &str) -> Result<CephUser, kube::Error> {
        let mut updated = record.clone();
        let finalizers = updated.metadata.finalizers.get_or_insert_with(Vec::new);
        if !finalizers.iter().any(|f| f == finalizer) {
            finalizers.push(finalizer.to_string());
        }
        Ok(self.save("add_finalizer", updated))
    }

    async fn remove_finalizer(
        &self,
        record: &CephUser,
        finalizer: &str,
    ) -> Result<CephUser, kube::Error> {
        let mut updated = record.clone();
        if let Some(finalizers) = updated.metadata.finalizers.as_mut() {
            finalizers.retain(|f| f != finalizer);
        }
        Ok(self.save("remove_finalizer", updated))
    }

    async fn merge_spec(
        &self,
        record: &CephUser,
        spec_patch: serde_json::Value,
    ) -> Result<CephUser, kube::Error> {
        let mut spec = serde_json::to_value(&record.spec).map_err(kube::Error::SerdeError)?;
        merge(&mut spec, spec_patch);
        let mut updated = record.clone();
        updated.spec = serde_json::from_value(spec).map_err(kube::Error::SerdeError)?;
        Ok(self.save("merge_spec", updated))
    }

    async fn set_status(&self, record: &CephUser, status: &ManagedStatus) -> Result<CephUser, kube::Error> {
        let mut updated = record.clone();
        updated.status = Some(status.clone());
        Ok(self.save("set_status", updated))
    }
}

/// RFC 7386 JSON merge
fn merge(target: &mut serde_json::Value, patch: serde_json::Value) {
    match patch {
        serde_json::Value::Object(fields) => {
            if !target.is_object() {
                *target = serde_json::Value::Object(serde_json::Map::new());
            }
            if let serde_json::Value::Object(map) = target {
                for (key, value) in fields {
                    if value.is_null() {
                        map.remove(&key);
                    } else {
                        merge(map.entry(key).or_insert(serde_json::Value::Null), value);
                    }
                }
            }
        }
        other => *target = other,
    }
}

/// Publisher remembering every event reason
#[derive(Debug, Default)]
pub struct RecordingEvents {
    pub events: Mutex<Vec<(EventType, String)>>,
}

impl RecordingEvents {
    pub fn reasons(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, reason)| reason.clone())
            .collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingEvents {
    async fn publish(
        &self,
        _resource_ref: &ObjectReference,
        type_: EventType,
        reason: &str,
        _action: &str,
        _note: Option<String>,
    ) {
        self.events.lock().unwrap().push((type_, reason.to_string()));
    }
}

/// An engine wired to fresh fakes
pub struct Harness {
    pub admin: Arc<FakeAdmin>,
    pub credentials: Arc<FakeCredentials>,
    pub records: Arc<FakeRecords>,
    pub events: Arc<RecordingEvents>,
    pub registry: Arc<ClientRegistry>,
    pub backends: Arc<StaticBackends>,
    pub engine: CephUserEngine,
}

impl Harness {
    pub fn new() -> Self {
        let admin = Arc::new(FakeAdmin::default());
        let credentials = Arc::new(FakeCredentials::default());
        let records = Arc::new(FakeRecords::default());
        let events = Arc::new(RecordingEvents::default());
        let registry = Arc::new(ClientRegistry::new());

        let backend = Arc::new(Backend {
            name: BACKEND.to_string(),
            host_name: "rgw.prod1.example.com".to_string(),
            use_https: true,
            users: UserService::new(Arc::clone(&admin) as Arc<dyn AdminApi>),
            credentials: Arc::clone(&credentials) as Arc<dyn CredentialStore>,
        });
        let backends = Arc::new(StaticBackends {
            backend,
            invalidated: Mutex::new(Vec::new()),
        });
        let engine = Self::user_engine(&backends, &records, &events, &registry);

        Self {
            admin,
            credentials,
            records,
            events,
            registry,
            backends,
            engine,
        }
    }

    fn user_engine(
        backends: &Arc<StaticBackends>,
        records: &Arc<FakeRecords>,
        events: &Arc<RecordingEvents>,
        registry: &Arc<ClientRegistry>,
    ) -> CephUserEngine {
        CephUserEngine::new(
            Arc::clone(backends) as Arc<dyn BackendResolver>,
            Arc::clone(records) as Arc<dyn RecordStore<CephUser>>,
            Arc::clone(events) as Arc<dyn EventPublisher>,
            Arc::clone(registry),
            Duration::from_secs(60),
        )
    }

    pub fn backend(&self) -> Arc<Backend> {
        Arc::clone(&self.backends.backend)
    }

    /// Controller context over the same fakes, for driving the reconcile entry points
    pub fn reconciler(&self, config: ControllerConfig) -> Reconciler {
        let users = Self::user_engine(&self.backends, &self.records, &self.events, &self.registry);
        let buckets = BucketEngine::new(
            Arc::clone(&self.registry),
            Arc::new(NoClients),
            Arc::new(FixedOwner::default()),
            Arc::new(FakeBucketRecords::default()),
            Arc::clone(&self.events) as Arc<dyn EventPublisher>,
            Duration::from_secs(60),
        );
        Reconciler::new(users, buckets, config)
    }
}

/// Owner lookup answering with one preset CephUser
#[derive(Debug, Default)]
pub struct FixedOwner(pub Option<CephUser>);

#[async_trait]
impl OwnerLookup for FixedOwner {
    async fn find_owner(&self, uid: &str) -> Result<Option<CephUser>, kube::Error> {
        Ok(self
            .0
            .clone()
            .filter(|owner| owner.spec.for_provider.uid == uid))
    }
}

/// Factory for a registry that must never miss
#[derive(Debug)]
pub struct NoClients;

#[async_trait]
impl ClientFactory<aws_sdk_s3::Client> for NoClients {
    async fn build(&self, record: &CephUser) -> Result<aws_sdk_s3::Client, RegistryError> {
        Err(RegistryError::MissingCredentials {
            uid: record.spec.for_provider.uid.clone(),
        })
    }
}

/// Bucket records kept in memory
#[derive(Debug, Default)]
pub struct FakeBucketRecords {
    pub records: Mutex<HashMap<String, Bucket>>,
}

impl FakeBucketRecords {
    pub fn latest(&self, name: &str) -> Option<Bucket> {
        self.records.lock().unwrap().get(name).cloned()
    }

    fn save(&self, record: Bucket) -> Bucket {
        self.records.lock().unwrap().insert(
            record.metadata.name.clone().unwrap_or_default(),
            record.clone(),
        );
        record
    }
}

#[async_trait]
impl RecordStore<Bucket> for FakeBucketRecords {
    async fn add_finalizer(&self, record: &Bucket, finalizer: &str) -> Result<Bucket, kube::Error> {
        let mut updated = record.clone();
        let finalizers = updated.metadata.finalizers.get_or_insert_with(Vec::new);
        if !finalizers.iter().any(|f| f == finalizer) {
            finalizers.push(finalizer.to_string());
        }
        Ok(self.save(updated))
    }

    async fn remove_finalizer(&self, record: &Bucket, finalizer: &str) -> Result<Bucket, kube::Error> {
        let mut updated = record.clone();
        if let Some(finalizers) = updated.metadata.finalizers.as_mut() {
            finalizers.retain(|f| f != finalizer);
        }
        Ok(self.save(updated))
    }

    async fn merge_spec(
        &self,
        record: &Bucket,
        _spec_patch: serde_json::Value,
    ) -> Result<Bucket, kube::Error> {
        Ok(record.clone())
    }

    async fn set_status(&self, record: &Bucket, status: &ManagedStatus) -> Result<Bucket, kube::Error> {
        let mut updated = record.clone();
        updated.status = Some(status.clone());
        Ok(self.save(updated))
    }
}

pub fn ceph_user(uid: &str) -> CephUser {
    let mut user = CephUser::new(
        uid,
        CephUserSpec {
            for_provider: CephUserParameters {
                uid: uid.to_string(),
                displayed_name: format!("{uid} display"),
                user_quota_max_buckets: None,
                user_quota_max_size_kb: None,
                user_quota_max_objects: None,
            },
            provider_config_ref: ProviderConfigReference {
                name: BACKEND.to_string(),
            },
            credentials_ref: None,
        },
    );
    user.metadata.generation = Some(1);
    user
}

/// `record` marked for deletion by the API server
pub fn deleting<K: kube::Resource>(mut record: K) -> K {
    let meta: k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta =
        serde_json::from_value(serde_json::json!({ "deletionTimestamp": "2024-01-01T00:00:00Z" }))
            .unwrap();
    record.meta_mut().deletion_timestamp = meta.deletion_timestamp;
    record
}

pub fn bucket(name: &str, owner_uid: &str) -> Bucket {
    let mut bucket = Bucket::new(
        name,
        BucketSpec {
            for_provider: BucketParameters {
                external_bucket_name: name.to_string(),
                location_constraint: None,
                ceph_user_uid: owner_uid.to_string(),
            },
        },
    );
    bucket.metadata.generation = Some(1);
    bucket
}
