//! # Admin API Types

use crate::credentials::CredentialPair;
use serde::Deserialize;

/// Per-user quota
///
/// `max_buckets` travels with the user itself; size and object limits are set
/// by a separate quota call. Unset limits are sent as `-1` (unlimited).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserQuota {
    pub max_buckets: Option<i32>,
    pub max_size_kb: Option<i64>,
    pub max_objects: Option<i64>,
}

/// User as reported by `GET /admin/user`
///
/// Keys are deliberately not deserialized.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RgwUser {
    pub user_id: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub max_buckets: Option<i64>,
    #[serde(default)]
    pub suspended: Option<i64>,
}

/// Parameters of a user create call
#[derive(Debug, Clone)]
pub struct NewUser {
    pub uid: String,
    pub display_name: String,
    pub credentials: CredentialPair,
    pub max_buckets: Option<i32>,
}
