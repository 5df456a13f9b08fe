//! # CephUser
//!
//! Desired state of a RADOS Gateway user.

use crate::radosgw::UserQuota;
use serde::{Deserialize, Serialize};

/// CephUser Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: radosgw.io/v1alpha1
/// kind: CephUser
/// metadata:
///   name: alice
/// spec:
///   forProvider:
///     uid: alice
///     displayedName: Alice
///     userQuotaMaxBuckets: 10
///     userQuotaMaxSizeKB: 1048576
///   providerConfigRef:
///     name: ceph-prod1
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "CephUser",
    group = "radosgw.io",
    version = "v1alpha1",
    status = "crate::crd::ManagedStatus",
    shortname = "cu",
    category = "radosgw",
    printcolumn = r#"{"name":"UID", "type":"string", "jsonPath":".spec.forProvider.uid"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CephUserSpec {
    pub for_provider: CephUserParameters,
    pub provider_config_ref: ProviderConfigReference,
    /// Where the generated keys were persisted
    /// Written once by the controller after the remote user is created
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_ref: Option<CredentialsReference>,
}

#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CephUserParameters {
    /// User id, unique within a backend and immutable
    pub uid: String,
    pub displayed_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_quota_max_buckets: Option<i32>,
    #[serde(
        default,
        rename = "userQuotaMaxSizeKB",
        skip_serializing_if = "Option::is_none"
    )]
    pub user_quota_max_size_kb: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_quota_max_objects: Option<i64>,
}

impl CephUserParameters {
    /// The declared quota, `None` when no quota field is set
    #[must_use]
    pub fn quota(&self) -> Option<UserQuota> {
        if self.user_quota_max_buckets.is_none()
            && self.user_quota_max_size_kb.is_none()
            && self.user_quota_max_objects.is_none()
        {
            return None;
        }
        Some(UserQuota {
            max_buckets: self.user_quota_max_buckets,
            max_size_kb: self.user_quota_max_size_kb,
            max_objects: self.user_quota_max_objects,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigReference {
    pub name: String,
}

/// Kind of store holding a user's generated credentials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum CredentialsKind {
    Vault,
    Secret,
}

/// Pointer to a persisted credential pair
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsReference {
    pub kind: CredentialsKind,
    /// Vault path (kind = Vault)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Secret name (kind = Secret)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}
