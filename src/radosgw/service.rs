//! # User Service
//!
//! Operation wrapper over an `AdminApi` that holds the idempotency contracts
//! the reconciliation engine depends on:
//!
//! - `exists`: `NoSuchUser` means `false`, any other error propagates
//! - `create`: `KeyExists` is success, any other error propagates
//! - `set_quota`, `remove`, `list_owned_buckets`: errors propagate as-is

use crate::radosgw::{AdminApi, AdminError, AdminErrorKind, NewUser, UserQuota};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct UserService {
    api: Arc<dyn AdminApi>,
}

impl std::fmt::Debug for UserService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserService").finish_non_exhaustive()
    }
}

impl UserService {
    pub fn new(api: Arc<dyn AdminApi>) -> Self {
        Self { api }
    }

    pub async fn exists(&self, uid: &str) -> Result<bool, AdminError> {
        match self.api.get_user(uid).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind == AdminErrorKind::NoSuchUser => {
                debug!(user.uid = uid, "User does not exist");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn create(&self, user: &NewUser) -> Result<(), AdminError> {
        match self.api.create_user(user).await {
            Ok(()) => {
                info!(user.uid = user.uid.as_str(), "Created user");
                Ok(())
            }
            Err(e) if e.kind == AdminErrorKind::KeyExists => {
                info!(user.uid = user.uid.as_str(), "User keys already exist, treating create as done");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn set_quota(&self, uid: &str, quota: &UserQuota) -> Result<(), AdminError> {
        self.api.set_user_quota(uid, quota).await?;
        info!(
            user.uid = uid,
            quota.max_size_kb = quota.max_size_kb,
            quota.max_objects = quota.max_objects,
            "Set user quota"
        );
        Ok(())
    }

    pub async fn remove(&self, uid: &str) -> Result<(), AdminError> {
        self.api.remove_user(uid).await?;
        info!(user.uid = uid, "Removed user");
        Ok(())
    }

    /// Buckets owned by `uid`, used by the delete guard
    pub async fn list_owned_buckets(&self, uid: &str) -> Result<Vec<String>, AdminError> {
        self.api.list_user_buckets(uid).await
    }
}
