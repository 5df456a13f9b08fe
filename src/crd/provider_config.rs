//! # ProviderConfig
//!
//! One ProviderConfig per RADOS Gateway backend. The resource name is the
//! backend name and always starts with `ceph-`.

use serde::{Deserialize, Serialize};

/// ProviderConfig Custom Resource Definition
///
/// # Example
///
/// ```yaml
/// apiVersion: radosgw.io/v1alpha1
/// kind: ProviderConfig
/// metadata:
///   name: ceph-prod1
/// spec:
///   hostName: rgw.prod1.example.com
///   useHttps: true
///   credentials:
///     source: Vault
///     path: ceph/prod1/admin
///   credentialsVault:
///     address: https://vault.example.com
///     role: radosgw-users
///     mountPath: secret
///     kvVersion: "2"
///     secretPath: radosgw
/// ```
#[derive(kube::CustomResource, Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ProviderConfig",
    group = "radosgw.io",
    version = "v1alpha1",
    shortname = "rgwpc",
    printcolumn = r#"{"name":"Host", "type":"string", "jsonPath":".spec.hostName"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfigSpec {
    /// Admin and data-plane endpoint, with or without a scheme
    pub host_name: String,
    /// Scheme used for the endpoint; overrides any scheme present in `hostName`
    #[serde(default = "crate::crd::default_true")]
    pub use_https: bool,
    /// Where the controller's own admin keys for this backend live
    pub credentials: AdminCredentialsSource,
    /// Where generated user credentials are persisted
    /// When absent, credentials are written to Kubernetes Secrets in the controller namespace
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_vault: Option<CredentialsVaultConfig>,
}

/// Source of the admin credentials for a backend
#[derive(Debug, Clone, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase", tag = "source")]
pub enum AdminCredentialsSource {
    /// Keys injected into the controller's environment
    #[serde(rename_all = "camelCase")]
    Environment {
        #[serde(default = "default_access_key_env")]
        access_key_env: String,
        #[serde(default = "default_secret_key_env")]
        secret_key_env: String,
    },
    /// Keys held in a Kubernetes Secret
    #[serde(rename_all = "camelCase")]
    Secret {
        name: String,
        namespace: String,
        #[serde(default = "default_access_key_key")]
        access_key_key: String,
        #[serde(default = "default_secret_key_key")]
        secret_key_key: String,
    },
    /// Keys read through the privileged admin vault connection
    Vault { path: String },
}

/// Vault connection used to persist generated user credentials
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CredentialsVaultConfig {
    pub address: String,
    /// Kubernetes auth role
    pub role: String,
    #[serde(default = "default_mount_path")]
    pub mount_path: String,
    /// KV engine version, "1" or "2"
    #[serde(default = "default_kv_version")]
    pub kv_version: String,
    /// Prefix under which `<backend>/users/<uid>` is written
    pub secret_path: String,
}

fn default_access_key_env() -> String {
    "RGW_ADMIN_ACCESS_KEY".to_string()
}

fn default_secret_key_env() -> String {
    "RGW_ADMIN_SECRET_KEY".to_string()
}

fn default_access_key_key() -> String {
    crate::constants::ACCESS_KEY_FIELD.to_string()
}

fn default_secret_key_key() -> String {
    crate::constants::SECRET_KEY_FIELD.to_string()
}

fn default_mount_path() -> String {
    "secret".to_string()
}

fn default_kv_version() -> String {
    "2".to_string()
}
