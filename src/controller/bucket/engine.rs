//! # Bucket Engine
//!
//! Creates and removes a Bucket's remote bucket with the S3 client of the
//! CephUser that owns it. Clients come from the client registry; a miss builds
//! one from the owner's record and stored credentials.

use crate::constants::BUCKET_FINALIZER;
use crate::controller::conditions;
use crate::controller::events::{actions, reasons, EventPublisher};
use crate::controller::records::{has_finalizer, RecordStore};
use crate::controller::types::ReconcilerError;
use crate::crd::{Bucket, CephUser, Condition, Readiness};
use crate::registry::{ClientFactory, ClientRegistry, RegistryError};
use crate::s3;
use async_trait::async_trait;
use kube::api::{Api, ListParams};
use kube::runtime::events::EventType;
use kube::Resource;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lookup of the CephUser owning a uid
#[async_trait]
pub trait OwnerLookup: Send + Sync {
    async fn find_owner(&self, uid: &str) -> Result<Option<CephUser>, kube::Error>;
}

/// Scans CephUser resources for the one declaring `uid`
#[derive(Clone)]
pub struct KubeOwnerLookup {
    api: Api<CephUser>,
}

impl std::fmt::Debug for KubeOwnerLookup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeOwnerLookup").finish_non_exhaustive()
    }
}

impl KubeOwnerLookup {
    pub fn new(client: kube::Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl OwnerLookup for KubeOwnerLookup {
    async fn find_owner(&self, uid: &str) -> Result<Option<CephUser>, kube::Error> {
        let users = self.api.list(&ListParams::default()).await?;
        Ok(users
            .items
            .into_iter()
            .find(|u| u.spec.for_provider.uid == uid))
    }
}

pub struct BucketEngine {
    registry: Arc<ClientRegistry>,
    factory: Arc<dyn ClientFactory<aws_sdk_s3::Client>>,
    owners: Arc<dyn OwnerLookup>,
    records: Arc<dyn RecordStore<Bucket>>,
    events: Arc<dyn EventPublisher>,
    poll_interval: Duration,
}

impl std::fmt::Debug for BucketEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketEngine")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl BucketEngine {
    pub fn new(
        registry: Arc<ClientRegistry>,
        factory: Arc<dyn ClientFactory<aws_sdk_s3::Client>>,
        owners: Arc<dyn OwnerLookup>,
        records: Arc<dyn RecordStore<Bucket>>,
        events: Arc<dyn EventPublisher>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            registry,
            factory,
            owners,
            records,
            events,
            poll_interval,
        }
    }

    pub async fn reconcile(&self, record: &Bucket) -> Result<(), ReconcilerError> {
        let params = &record.spec.for_provider;
        let bucket = params.external_bucket_name.as_str();

        if record.meta().deletion_timestamp.is_some() {
            if !has_finalizer(record, BUCKET_FINALIZER) {
                return Ok(());
            }
            let client = self.connect(&params.ceph_user_uid).await?;
            s3::delete_bucket(&client, bucket).await?;
            self.records.remove_finalizer(record, BUCKET_FINALIZER).await?;
            info!(bucket, user.uid = params.ceph_user_uid.as_str(), "Deleted bucket");
            self.events
                .publish(
                    &record.object_ref(&()),
                    EventType::Normal,
                    reasons::BUCKET_DELETED,
                    actions::DELETE,
                    Some(format!("Deleted bucket '{bucket}'")),
                )
                .await;
            return Ok(());
        }

        let client = self.connect(&params.ceph_user_uid).await?;
        if s3::bucket_exists(&client, bucket).await? {
            debug!(bucket, "Bucket exists");
        } else {
            s3::create_bucket(&client, bucket, params.location_constraint.as_deref()).await?;
            info!(bucket, user.uid = params.ceph_user_uid.as_str(), "Created bucket");
            self.events
                .publish(
                    &record.object_ref(&()),
                    EventType::Normal,
                    reasons::BUCKET_CREATED,
                    actions::CREATE,
                    Some(format!("Created bucket '{bucket}'")),
                )
                .await;
        }

        let record = self.records.add_finalizer(record, BUCKET_FINALIZER).await?;
        let status = conditions::succeeded(
            record.status.as_ref(),
            record.meta().generation,
            "Present",
            Condition::ready(Readiness::Available, "Available", "bucket exists"),
            self.poll_interval,
        );
        self.records.set_status(&record, &status).await?;
        Ok(())
    }

    /// S3 client of the user owning the bucket
    ///
    /// Fails with a retryable error while the owner is missing or has not
    /// recorded its credentials yet.
    pub async fn connect(&self, uid: &str) -> Result<aws_sdk_s3::Client, ReconcilerError> {
        if let Some(client) = self.registry.get_by_uid(uid).await {
            return Ok(client);
        }
        debug!(user.uid = uid, "Client registry miss");

        let not_ready = || RegistryError::MissingCredentials {
            uid: uid.to_string(),
        };
        let owner = self.owners.find_owner(uid).await?.ok_or_else(not_ready)?;
        if owner.spec.credentials_ref.is_none() {
            return Err(not_ready().into());
        }
        Ok(self
            .registry
            .get_or_build(&owner, self.factory.as_ref())
            .await?)
    }

    pub async fn record_failure(&self, record: &Bucket, error: &ReconcilerError, retry_in: Duration) {
        let status = conditions::failed(
            record.status.as_ref(),
            record.meta().generation,
            "Unknown",
            Condition::ready(Readiness::Error, error.reason(), error.to_string()),
            retry_in,
        );
        if let Err(e) = self.records.set_status(record, &status).await {
            warn!(
                bucket = record.spec.for_provider.external_bucket_name.as_str(),
                error = %e,
                "Failed to record failure on status"
            );
        }
        self.events
            .publish(
                &record.object_ref(&()),
                EventType::Warning,
                reasons::RECONCILE_FAILED,
                actions::RECONCILE,
                Some(error.to_string()),
            )
            .await;
    }
}
