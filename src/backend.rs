//! # Backend Connections
//!
//! Resolves a ProviderConfig into a ready connection: a user service
//! authenticated with the backend's admin keys, and the credential store where
//! generated user keys for that backend are kept.
//!
//! Connections are cached per ProviderConfig name and rebuilt when the
//! ProviderConfig's generation changes. The vault login happens once per
//! connection and the token is reused.

use crate::credentials::{
    AdminCredentialsExtractor, CredentialStore, CredentialsError, KubeSecretCredentialStore,
    VaultCredentialStore,
};
use crate::crd::{CredentialsVaultConfig, ProviderConfig};
use crate::radosgw::{AdminError, RgwAdminClient, UserService};
use crate::s3::resolve_host_base;
use crate::vault::{KvVersion, VaultClient, VaultError, VaultSettings};
use async_trait::async_trait;
use kube::api::Api;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, info_span, Instrument};

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("ProviderConfig '{name}' not found")]
    ProviderConfigNotFound { name: String },

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("admin credentials for backend '{name}': {source}")]
    AdminCredentials {
        name: String,
        #[source]
        source: CredentialsError,
    },

    #[error("credential store for backend '{name}': {source}")]
    CredentialStore {
        name: String,
        #[source]
        source: CredentialsError,
    },

    #[error("credentials vault for backend '{name}': {source}")]
    Vault {
        name: String,
        #[source]
        source: VaultError,
    },

    #[error("admin client for backend '{name}': {source}")]
    Admin {
        name: String,
        #[source]
        source: AdminError,
    },
}

impl BackendError {
    /// Whether a later attempt may succeed without a configuration change
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            // The ProviderConfig may simply not be applied yet
            BackendError::ProviderConfigNotFound { .. } | BackendError::Kube(_) => true,
            BackendError::AdminCredentials { source, .. }
            | BackendError::CredentialStore { source, .. } => source.is_retryable(),
            BackendError::Vault { source, .. } => source.is_retryable(),
            BackendError::Admin { source, .. } => source.is_retryable(),
        }
    }

    /// The backend or its vault rejected the credentials of the cached connection
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        match self {
            BackendError::ProviderConfigNotFound { .. } | BackendError::Kube(_) => false,
            BackendError::AdminCredentials { source, .. }
            | BackendError::CredentialStore { source, .. } => source.is_auth_failure(),
            BackendError::Vault { source, .. } => source.is_auth_failure(),
            BackendError::Admin { source, .. } => source.is_auth_failure(),
        }
    }
}

/// A connected storage backend
pub struct Backend {
    /// ProviderConfig name
    pub name: String,
    pub host_name: String,
    pub use_https: bool,
    pub users: UserService,
    pub credentials: Arc<dyn CredentialStore>,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("name", &self.name)
            .field("host_name", &self.host_name)
            .field("use_https", &self.use_https)
            .finish_non_exhaustive()
    }
}

/// Lookup of connected backends by ProviderConfig name
#[async_trait]
pub trait BackendResolver: Send + Sync {
    async fn resolve(&self, provider_config_name: &str) -> Result<Arc<Backend>, BackendError>;

    /// Drop any cached connection so the next `resolve` reconnects
    async fn invalidate(&self, provider_config_name: &str);
}

#[derive(Debug)]
struct CachedBackend {
    generation: Option<i64>,
    backend: Arc<Backend>,
}

/// Builds backends from ProviderConfig resources
pub struct BackendConnector {
    client: kube::Client,
    extractor: AdminCredentialsExtractor,
    controller_namespace: String,
    sa_token_path: String,
    cache: RwLock<HashMap<String, CachedBackend>>,
}

impl std::fmt::Debug for BackendConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConnector")
            .field("controller_namespace", &self.controller_namespace)
            .finish_non_exhaustive()
    }
}

impl BackendConnector {
    pub fn new(
        client: kube::Client,
        extractor: AdminCredentialsExtractor,
        controller_namespace: &str,
        sa_token_path: &str,
    ) -> Self {
        Self {
            client,
            extractor,
            controller_namespace: controller_namespace.to_string(),
            sa_token_path: sa_token_path.to_string(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    async fn connect(&self, config: &ProviderConfig, name: &str) -> Result<Backend, BackendError> {
        let spec = &config.spec;

        let admin_credentials = self
            .extractor
            .extract(&spec.credentials)
            .await
            .map_err(|source| BackendError::AdminCredentials {
                name: name.to_string(),
                source,
            })?;

        let endpoint = resolve_host_base(&spec.host_name, spec.use_https);
        let admin = RgwAdminClient::new(&endpoint, admin_credentials).map_err(|source| {
            BackendError::Admin {
                name: name.to_string(),
                source,
            }
        })?;

        let credentials: Arc<dyn CredentialStore> = match &spec.credentials_vault {
            Some(vault_config) => Arc::new(self.connect_vault_store(vault_config, name).await?),
            None => {
                debug!(
                    backend = name,
                    namespace = self.controller_namespace.as_str(),
                    "No credentialsVault configured, using Secrets for user credentials"
                );
                Arc::new(KubeSecretCredentialStore::new(
                    self.client.clone(),
                    &self.controller_namespace,
                ))
            }
        };

        Ok(Backend {
            name: name.to_string(),
            host_name: spec.host_name.clone(),
            use_https: spec.use_https,
            users: UserService::new(Arc::new(admin)),
            credentials,
        })
    }

    async fn connect_vault_store(
        &self,
        vault_config: &CredentialsVaultConfig,
        name: &str,
    ) -> Result<VaultCredentialStore, BackendError> {
        let vault_error = |source| BackendError::Vault {
            name: name.to_string(),
            source,
        };

        let kv_version: KvVersion = vault_config.kv_version.parse().map_err(vault_error)?;
        let settings = VaultSettings {
            address: vault_config.address.clone(),
            role: vault_config.role.clone(),
            mount_path: vault_config.mount_path.clone(),
            kv_version,
        };
        let vault = VaultClient::connect(&settings, &self.sa_token_path)
            .await
            .map_err(vault_error)?;

        VaultCredentialStore::new(vault, &vault_config.secret_path, name).map_err(|source| {
            BackendError::CredentialStore {
                name: name.to_string(),
                source,
            }
        })
    }
}

#[async_trait]
impl BackendResolver for BackendConnector {
    async fn resolve(&self, provider_config_name: &str) -> Result<Arc<Backend>, BackendError> {
        let span = info_span!("backend.resolve", backend = provider_config_name);
        async move {
            let api: Api<ProviderConfig> = Api::all(self.client.clone());
            let config = api.get_opt(provider_config_name).await?.ok_or_else(|| {
                BackendError::ProviderConfigNotFound {
                    name: provider_config_name.to_string(),
                }
            })?;
            let generation = config.metadata.generation;

            {
                let cache = self.cache.read().await;
                if let Some(cached) = cache.get(provider_config_name) {
                    if cached.generation == generation {
                        return Ok(Arc::clone(&cached.backend));
                    }
                }
            }

            // Connect without holding the lock; a concurrent connect for the
            // same name is harmless, the last writer wins
            let backend = Arc::new(self.connect(&config, provider_config_name).await?);
            info!(backend = provider_config_name, generation = ?generation, "Connected backend");

            self.cache.write().await.insert(
                provider_config_name.to_string(),
                CachedBackend {
                    generation,
                    backend: Arc::clone(&backend),
                },
            );
            Ok(backend)
        }
        .instrument(span)
        .await
    }

    async fn invalidate(&self, provider_config_name: &str) {
        if self.cache.write().await.remove(provider_config_name).is_some() {
            debug!(backend = provider_config_name, "Dropped cached backend connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(BackendError::ProviderConfigNotFound {
            name: "ceph-prod1".to_string()
        }
        .is_retryable());

        let bad_name = BackendError::CredentialStore {
            name: "prod1".to_string(),
            source: CredentialsError::InvalidBackendName {
                name: "prod1".to_string(),
            },
        };
        assert!(!bad_name.is_retryable());

        let bad_kv = BackendError::Vault {
            name: "ceph-prod1".to_string(),
            source: VaultError::UnsupportedKvVersion("3".to_string()),
        };
        assert!(!bad_kv.is_retryable());
    }
}
