//! # Admin Credential Extractor
//!
//! Resolves the controller's own admin keys for a backend from the source
//! declared on its ProviderConfig.

use crate::constants::{ACCESS_KEY_FIELD, SECRET_KEY_FIELD};
use crate::credentials::{CredentialPair, CredentialsError};
use crate::crd::AdminCredentialsSource;
use crate::vault::VaultClient;
use k8s_openapi::api::core::v1::Secret;
use kube::api::Api;
use tracing::{debug, info_span, Instrument};

/// Resolves admin credentials from environment variables, Secrets or the admin vault
#[derive(Clone)]
pub struct AdminCredentialsExtractor {
    client: kube::Client,
    admin_vault: Option<VaultClient>,
}

impl std::fmt::Debug for AdminCredentialsExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminCredentialsExtractor")
            .field("admin_vault", &self.admin_vault)
            .finish_non_exhaustive()
    }
}

impl AdminCredentialsExtractor {
    /// `admin_vault` is the privileged connection; `None` when it is disabled
    pub fn new(client: kube::Client, admin_vault: Option<VaultClient>) -> Self {
        Self {
            client,
            admin_vault,
        }
    }

    pub async fn extract(
        &self,
        source: &AdminCredentialsSource,
    ) -> Result<CredentialPair, CredentialsError> {
        let span = info_span!("credentials.extract_admin");
        async move {
            match source {
                AdminCredentialsSource::Environment {
                    access_key_env,
                    secret_key_env,
                } => from_environment(access_key_env, secret_key_env),
                AdminCredentialsSource::Secret {
                    name,
                    namespace,
                    access_key_key,
                    secret_key_key,
                } => {
                    self.from_secret(name, namespace, access_key_key, secret_key_key)
                        .await
                }
                AdminCredentialsSource::Vault { path } => self.from_vault(path).await,
            }
        }
        .instrument(span)
        .await
    }

    async fn from_secret(
        &self,
        name: &str,
        namespace: &str,
        access_key_key: &str,
        secret_key_key: &str,
    ) -> Result<CredentialPair, CredentialsError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = api.get(name).await?;
        let location = format!("Secret {namespace}/{name}");
        let data = secret.data.unwrap_or_default();

        let field = |key: &str| -> Result<String, CredentialsError> {
            let bytes = data.get(key).ok_or_else(|| CredentialsError::MissingField {
                field: key.to_string(),
                location: location.clone(),
            })?;
            String::from_utf8(bytes.0.clone()).map_err(|_| CredentialsError::InvalidUtf8 {
                field: key.to_string(),
                location: location.clone(),
            })
        };

        debug!(secret.name = name, secret.namespace = namespace, "Loaded admin credentials from Secret");
        Ok(CredentialPair::new(field(access_key_key)?, field(secret_key_key)?))
    }

    async fn from_vault(&self, path: &str) -> Result<CredentialPair, CredentialsError> {
        let vault = self
            .admin_vault
            .as_ref()
            .ok_or_else(|| CredentialsError::AdminVaultUnavailable {
                path: path.to_string(),
            })?;

        let location = format!("admin vault path '{path}'");
        let data = vault
            .read(path)
            .await?
            .ok_or_else(|| CredentialsError::MissingField {
                field: ACCESS_KEY_FIELD.to_string(),
                location: location.clone(),
            })?;

        let field = |key: &str| {
            data.get(key)
                .cloned()
                .ok_or_else(|| CredentialsError::MissingField {
                    field: key.to_string(),
                    location: location.clone(),
                })
        };

        debug!(vault.path = path, "Loaded admin credentials from vault");
        Ok(CredentialPair::new(
            field(ACCESS_KEY_FIELD)?,
            field(SECRET_KEY_FIELD)?,
        ))
    }
}

fn from_environment(
    access_key_env: &str,
    secret_key_env: &str,
) -> Result<CredentialPair, CredentialsError> {
    let read = |name: &str| {
        std::env::var(name)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CredentialsError::MissingEnvironment {
                name: name.to_string(),
            })
    };
    Ok(CredentialPair::new(read(access_key_env)?, read(secret_key_env)?))
}
