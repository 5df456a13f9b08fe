//! # Custom Resource Definitions
//!
//! CRD types served by the controller under `radosgw.io/v1alpha1`.
//!
//! ## Module Structure
//!
//! - `provider_config.rs` - Backend endpoint and credential sources
//! - `cephuser.rs` - Desired RADOS Gateway user
//! - `bucket.rs` - Bucket owned by a CephUser
//! - `status.rs` - Status and condition types shared by both managed kinds

mod bucket;
mod cephuser;
mod provider_config;
mod status;

pub use bucket::{Bucket, BucketParameters, BucketSpec};
pub use cephuser::{
    CephUser, CephUserParameters, CephUserSpec, CredentialsKind, CredentialsReference,
    ProviderConfigReference,
};
pub use provider_config::{
    AdminCredentialsSource, CredentialsVaultConfig, ProviderConfig, ProviderConfigSpec,
};
pub use status::{Condition, ManagedStatus, Readiness, READY_CONDITION};

/// Default value for boolean fields that default to true
#[must_use]
pub fn default_true() -> bool {
    true
}
