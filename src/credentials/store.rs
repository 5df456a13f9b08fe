//! # Credential Stores
//!
//! Persistence of generated user credentials, keyed by user id.
//!
//! `VaultCredentialStore` writes to `<secretPath>/<backend>/users/<uid>` on the
//! backend's credentials vault. `KubeSecretCredentialStore` is the legacy path,
//! an opaque Secret named `<uid>-credentials` in the controller namespace.

use crate::constants::{
    ACCESS_KEY_FIELD, BACKEND_NAME_PREFIX, CONTROLLER_NAME, CREDENTIALS_SECRET_SUFFIX,
    SECRET_KEY_FIELD,
};
use crate::credentials::{CredentialPair, CredentialsError};
use crate::crd::{CredentialsKind, CredentialsReference};
use crate::vault::VaultClient;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, Patch, PatchParams};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

/// Persistence of generated credential pairs for one backend
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Store `pair` for `uid`, replacing any previous pair
    async fn put(&self, uid: &str, pair: &CredentialPair) -> Result<(), CredentialsError>;

    /// The pair stored for `uid`, `None` when nothing is stored
    async fn get(&self, uid: &str) -> Result<Option<CredentialPair>, CredentialsError>;

    /// Erase the pair stored for `uid`; erasing an absent pair succeeds
    async fn delete(&self, uid: &str) -> Result<(), CredentialsError>;

    /// Where the pair for `uid` lives, as recorded on the CephUser
    fn reference(&self, uid: &str) -> Result<CredentialsReference, CredentialsError>;
}

/// Backend name of a ProviderConfig: its name with the `ceph-` prefix removed
pub fn backend_name(provider_config_name: &str) -> Result<&str, CredentialsError> {
    provider_config_name
        .strip_prefix(BACKEND_NAME_PREFIX)
        .ok_or_else(|| CredentialsError::InvalidBackendName {
            name: provider_config_name.to_string(),
        })
}

/// Vault path of a user's credentials: `<prefix>/<backend>/users/<uid>`
///
/// Fails when the ProviderConfig name does not carry the `ceph-` prefix.
pub fn build_user_secret_path(
    secret_path_prefix: &str,
    provider_config_name: &str,
    uid: &str,
) -> Result<String, CredentialsError> {
    let backend = backend_name(provider_config_name)?;
    Ok(format!("{secret_path_prefix}/{backend}/users/{uid}"))
}

fn pair_from_map(
    data: &HashMap<String, String>,
    location: &str,
) -> Result<CredentialPair, CredentialsError> {
    let field = |name: &str| {
        data.get(name)
            .cloned()
            .ok_or_else(|| CredentialsError::MissingField {
                field: name.to_string(),
                location: location.to_string(),
            })
    };
    Ok(CredentialPair::new(
        field(ACCESS_KEY_FIELD)?,
        field(SECRET_KEY_FIELD)?,
    ))
}

/// User credentials held in the backend's credentials vault
#[derive(Debug, Clone)]
pub struct VaultCredentialStore {
    vault: VaultClient,
    secret_path_prefix: String,
    provider_config_name: String,
}

impl VaultCredentialStore {
    /// Fails fast when `provider_config_name` does not carry the `ceph-` prefix
    pub fn new(
        vault: VaultClient,
        secret_path_prefix: &str,
        provider_config_name: &str,
    ) -> Result<Self, CredentialsError> {
        backend_name(provider_config_name)?;
        Ok(Self {
            vault,
            secret_path_prefix: secret_path_prefix.trim_end_matches('/').to_string(),
            provider_config_name: provider_config_name.to_string(),
        })
    }

    fn path(&self, uid: &str) -> Result<String, CredentialsError> {
        build_user_secret_path(&self.secret_path_prefix, &self.provider_config_name, uid)
    }
}

#[async_trait]
impl CredentialStore for VaultCredentialStore {
    async fn put(&self, uid: &str, pair: &CredentialPair) -> Result<(), CredentialsError> {
        let path = self.path(uid)?;
        let data = HashMap::from([
            (ACCESS_KEY_FIELD.to_string(), pair.access_key().to_string()),
            (SECRET_KEY_FIELD.to_string(), pair.secret_key().to_string()),
        ]);
        self.vault.write(&path, &data).await?;
        info!(user.uid = uid, vault.path = path.as_str(), "Stored user credentials in vault");
        Ok(())
    }

    async fn get(&self, uid: &str) -> Result<Option<CredentialPair>, CredentialsError> {
        let path = self.path(uid)?;
        match self.vault.read(&path).await? {
            Some(data) => Ok(Some(pair_from_map(&data, &format!("vault path '{path}'"))?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, uid: &str) -> Result<(), CredentialsError> {
        let path = self.path(uid)?;
        self.vault.delete(&path).await?;
        info!(user.uid = uid, vault.path = path.as_str(), "Erased user credentials from vault");
        Ok(())
    }

    fn reference(&self, uid: &str) -> Result<CredentialsReference, CredentialsError> {
        Ok(CredentialsReference {
            kind: CredentialsKind::Vault,
            path: Some(self.path(uid)?),
            name: None,
            namespace: None,
        })
    }
}

/// User credentials held in `<uid>-credentials` Secrets in one namespace
#[derive(Clone)]
pub struct KubeSecretCredentialStore {
    api: Api<Secret>,
    namespace: String,
}

impl std::fmt::Debug for KubeSecretCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretCredentialStore")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl KubeSecretCredentialStore {
    pub fn new(client: kube::Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            namespace: namespace.to_string(),
        }
    }

    /// Name of the Secret holding `uid`'s credentials
    #[must_use]
    pub fn secret_name(uid: &str) -> String {
        format!("{uid}{CREDENTIALS_SECRET_SUFFIX}")
    }

    fn build_secret(&self, uid: &str, pair: &CredentialPair) -> Secret {
        let data = BTreeMap::from([
            (
                ACCESS_KEY_FIELD.to_string(),
                ByteString(pair.access_key().as_bytes().to_vec()),
            ),
            (
                SECRET_KEY_FIELD.to_string(),
                ByteString(pair.secret_key().as_bytes().to_vec()),
            ),
        ]);
        Secret {
            metadata: ObjectMeta {
                name: Some(Self::secret_name(uid)),
                namespace: Some(self.namespace.clone()),
                labels: Some(BTreeMap::from([(
                    "app.kubernetes.io/managed-by".to_string(),
                    CONTROLLER_NAME.to_string(),
                )])),
                ..Default::default()
            },
            data: Some(data),
            type_: Some("Opaque".to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl CredentialStore for KubeSecretCredentialStore {
    async fn put(&self, uid: &str, pair: &CredentialPair) -> Result<(), CredentialsError> {
        let name = Self::secret_name(uid);
        let secret = self.build_secret(uid, pair);
        let params = PatchParams::apply(CONTROLLER_NAME).force();
        self.api.patch(&name, &params, &Patch::Apply(&secret)).await?;
        info!(
            user.uid = uid,
            secret.name = name.as_str(),
            secret.namespace = self.namespace.as_str(),
            "Stored user credentials in Secret"
        );
        Ok(())
    }

    async fn get(&self, uid: &str) -> Result<Option<CredentialPair>, CredentialsError> {
        let name = Self::secret_name(uid);
        let Some(secret) = self.api.get_opt(&name).await? else {
            return Ok(None);
        };
        let location = format!("Secret {}/{}", self.namespace, name);
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
        Ok(Some(CredentialPair::new(
            field(ACCESS_KEY_FIELD)?,
            field(SECRET_KEY_FIELD)?,
        )))
    }

    async fn delete(&self, uid: &str) -> Result<(), CredentialsError> {
        let name = Self::secret_name(uid);
        match self.api.delete(&name, &DeleteParams::default()).await {
            Ok(_) => {
                info!(user.uid = uid, secret.name = name.as_str(), "Erased credentials Secret");
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => {
                debug!(user.uid = uid, secret.name = name.as_str(), "Credentials Secret already absent");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn reference(&self, uid: &str) -> Result<CredentialsReference, CredentialsError> {
        Ok(CredentialsReference {
            kind: CredentialsKind::Secret,
            path: None,
            name: Some(Self::secret_name(uid)),
            namespace: Some(self.namespace.clone()),
        })
    }
}
