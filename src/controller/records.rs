//! # Record Store
//!
//! Field-level writes to CephUser and Bucket resources.
//!
//! The controller only ever touches finalizers, `spec.credentialsRef` and the
//! status subresource, each through a JSON merge patch. Metadata and spec
//! patches carry the `resourceVersion` the controller observed, so the API
//! server rejects them when the record changed in between. Every write returns
//! the updated record; callers continue from that copy.

use crate::crd::ManagedStatus;
use async_trait::async_trait;
use kube::api::{Api, Patch, PatchParams};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt::Debug;
use tracing::debug;

#[async_trait]
pub trait RecordStore<K>: Send + Sync
where
    K: Send + Sync + 'static,
{
    /// Add `finalizer` unless already present
    async fn add_finalizer(&self, record: &K, finalizer: &str) -> Result<K, kube::Error>;

    /// Remove `finalizer` if present
    async fn remove_finalizer(&self, record: &K, finalizer: &str) -> Result<K, kube::Error>;

    /// Merge `spec_patch` into the record's spec
    async fn merge_spec(&self, record: &K, spec_patch: serde_json::Value)
        -> Result<K, kube::Error>;

    /// Replace the status subresource
    async fn set_status(&self, record: &K, status: &ManagedStatus) -> Result<K, kube::Error>;
}

/// Whether `record` carries `finalizer`
pub fn has_finalizer<K: Resource>(record: &K, finalizer: &str) -> bool {
    record
        .meta()
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|x| x == finalizer))
}

/// Record store over the Kubernetes API, for cluster-scoped kinds
pub struct KubeRecordStore<K> {
    api: Api<K>,
}

impl<K> Debug for KubeRecordStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeRecordStore").finish_non_exhaustive()
    }
}

impl<K> KubeRecordStore<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    pub fn new(client: kube::Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }

    async fn patch_finalizers(&self, record: &K, finalizers: Vec<String>) -> Result<K, kube::Error> {
        let patch = json!({
            "metadata": {
                "finalizers": finalizers,
                "resourceVersion": record.meta().resource_version,
            }
        });
        self.api
            .patch(&record.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
    }
}

#[async_trait]
impl<K> RecordStore<K> for KubeRecordStore<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    async fn add_finalizer(&self, record: &K, finalizer: &str) -> Result<K, kube::Error> {
        if has_finalizer(record, finalizer) {
            return Ok(record.clone());
        }
        let mut finalizers = record.finalizers().to_vec();
        finalizers.push(finalizer.to_string());
        debug!(resource.name = record.name_any().as_str(), finalizer, "Adding finalizer");
        self.patch_finalizers(record, finalizers).await
    }

    async fn remove_finalizer(&self, record: &K, finalizer: &str) -> Result<K, kube::Error> {
        if !has_finalizer(record, finalizer) {
            return Ok(record.clone());
        }
        let finalizers: Vec<String> = record
            .finalizers()
            .iter()
            .filter(|f| f.as_str() != finalizer)
            .cloned()
            .collect();
        debug!(resource.name = record.name_any().as_str(), finalizer, "Removing finalizer");
        self.patch_finalizers(record, finalizers).await
    }

    async fn merge_spec(
        &self,
        record: &K,
        spec_patch: serde_json::Value,
    ) -> Result<K, kube::Error> {
        let patch = json!({
            "metadata": { "resourceVersion": record.meta().resource_version },
            "spec": spec_patch,
        });
        self.api
            .patch(&record.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
    }

    async fn set_status(&self, record: &K, status: &ManagedStatus) -> Result<K, kube::Error> {
        let patch = json!({ "status": status });
        self.api
            .patch_status(&record.name_any(), &PatchParams::default(), &Patch::Merge(&patch))
            .await
    }
}
