//! # Client Factory
//!
//! Builds the client for one CephUser from its backend and stored credentials.

use crate::backend::BackendResolver;
use crate::crd::CephUser;
use crate::registry::RegistryError;
use crate::s3;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait ClientFactory<C>: Send + Sync {
    async fn build(&self, record: &CephUser) -> Result<C, RegistryError>;
}

/// Builds S3 clients from the user's stored credential pair
pub struct BackendClientFactory {
    backends: Arc<dyn BackendResolver>,
}

impl std::fmt::Debug for BackendClientFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendClientFactory").finish_non_exhaustive()
    }
}

impl BackendClientFactory {
    pub fn new(backends: Arc<dyn BackendResolver>) -> Self {
        Self { backends }
    }
}

#[async_trait]
impl ClientFactory<aws_sdk_s3::Client> for BackendClientFactory {
    async fn build(&self, record: &CephUser) -> Result<aws_sdk_s3::Client, RegistryError> {
        let uid = record.spec.for_provider.uid.as_str();
        let backend = self
            .backends
            .resolve(&record.spec.provider_config_ref.name)
            .await?;
        let pair = backend
            .credentials
            .get(uid)
            .await?
            .ok_or_else(|| RegistryError::MissingCredentials {
                uid: uid.to_string(),
            })?;
        Ok(s3::build_client(&backend.host_name, backend.use_https, &pair).await)
    }
}
