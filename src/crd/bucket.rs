//! # Bucket
//!
//! An S3 bucket owned by a CephUser.

use serde::{Deserialize, Serialize};

/// Bucket Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: radosgw.io/v1alpha1
/// kind: Bucket
/// metadata:
///   name: alice-logs
/// spec:
///   forProvider:
///     externalBucketName: alice-logs
///     cephUserUID: alice
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Bucket",
    group = "radosgw.io",
    version = "v1alpha1",
    status = "crate::crd::ManagedStatus",
    category = "radosgw",
    printcolumn = r#"{"name":"Bucket", "type":"string", "jsonPath":".spec.forProvider.externalBucketName"}"#,
    printcolumn = r#"{"name":"User", "type":"string", "jsonPath":".spec.forProvider.cephUserUID"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct BucketSpec {
    pub for_provider: BucketParameters,
}

#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BucketParameters {
    pub external_bucket_name: String,
    /// Region the bucket is created in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_constraint: Option<String>,
    /// UID of the owning CephUser
    #[serde(rename = "cephUserUID")]
    pub ceph_user_uid: String,
}
