//! # Vault Client
//!
//! Typed wrapper over the Vault KV secrets engine, versions 1 and 2, behind a
//! single read/write/delete interface.
//!
//! Authentication happens when the client is connected and the token is
//! reused for later calls. When vault rejects it (401/403) a client connected
//! through Kubernetes auth logs in again and repeats the call once; concurrent
//! callers share one renewal. The same type backs both the privileged admin
//! connection and the per-backend connections used for user credentials.
//!
//! ## Paths
//!
//! - KV v1: `/v1/<mount>/<path>`
//! - KV v2: `/v1/<mount>/data/<path>` with a `data` envelope on write and read

mod auth;

use crate::observability::OperationTracker;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{info, info_span, Instrument};
use zeroize::Zeroizing;

const SERVICE: &str = "vault";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("vault request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("vault returned {status} for '{path}': {body}")]
    Status {
        status: u16,
        path: String,
        body: String,
    },

    #[error("vault login failed: {0}")]
    Login(String),

    #[error("failed to read service-account token from {path}: {source}")]
    TokenFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported KV version: {0}")]
    UnsupportedKvVersion(String),

    #[error("malformed vault response: {0}")]
    MalformedResponse(String),
}

impl VaultError {
    /// Whether a later attempt may succeed without a configuration change
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            VaultError::Http(_) | VaultError::Login(_) | VaultError::TokenFile { .. } => true,
            VaultError::Status { status, .. } => {
                *status >= 500 || matches!(*status, 401 | 403 | 429)
            }
            VaultError::UnsupportedKvVersion(_) | VaultError::MalformedResponse(_) => false,
        }
    }

    /// Vault refused the token or the login itself
    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        match self {
            VaultError::Status { status, .. } => is_auth_status(*status),
            VaultError::Login(_) => true,
            _ => false,
        }
    }
}

fn is_auth_status(status: u16) -> bool {
    matches!(status, 401 | 403)
}

/// Version of the KV secrets engine mounted at the client's mount path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KvVersion {
    V1,
    V2,
}

impl FromStr for KvVersion {
    type Err = VaultError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1" => Ok(KvVersion::V1),
            "2" => Ok(KvVersion::V2),
            other => Err(VaultError::UnsupportedKvVersion(other.to_string())),
        }
    }
}

/// Connection parameters for one vault client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultSettings {
    pub address: String,
    /// Kubernetes auth role
    pub role: String,
    pub mount_path: String,
    pub kv_version: KvVersion,
}

/// Authenticated client for one vault mount
#[derive(Clone)]
pub struct VaultClient {
    http: reqwest::Client,
    address: String,
    token: Arc<RwLock<Zeroizing<String>>>,
    login: Option<Arc<auth::KubernetesLogin>>,
    mount_path: String,
    kv_version: KvVersion,
}

impl fmt::Debug for VaultClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultClient")
            .field("address", &self.address)
            .field("mount_path", &self.mount_path)
            .field("kv_version", &self.kv_version)
            .field("token", &"***")
            .field("renewable", &self.login.is_some())
            .finish()
    }
}

impl VaultClient {
    /// Authenticate and return a ready client
    ///
    /// Uses Kubernetes auth with the service-account token at `sa_token_path`,
    /// unless dev mode (`VAULT_TOKEN` and `VAULT_ADDR`) is active.
    pub async fn connect(settings: &VaultSettings, sa_token_path: &str) -> Result<Self, VaultError> {
        let http = build_http_client()?;
        let resolved = auth::resolve(&http, &settings.address, &settings.role, sa_token_path).await?;
        Ok(Self {
            http,
            address: resolved.address,
            token: Arc::new(RwLock::new(resolved.token)),
            login: resolved.login.map(Arc::new),
            mount_path: settings.mount_path.clone(),
            kv_version: settings.kv_version,
        })
    }

    /// Build a client around an already issued token
    pub fn with_token(
        address: &str,
        token: &str,
        mount_path: &str,
        kv_version: KvVersion,
    ) -> Result<Self, VaultError> {
        Ok(Self {
            http: build_http_client()?,
            address: address.trim_end_matches('/').to_string(),
            token: Arc::new(RwLock::new(Zeroizing::new(token.to_string()))),
            login: None,
            mount_path: mount_path.to_string(),
            kv_version,
        })
    }

    /// Renew the token through Kubernetes auth once vault rejects it
    #[must_use]
    pub fn with_kubernetes_login(mut self, role: &str, sa_token_path: &str) -> Self {
        self.login = Some(Arc::new(auth::KubernetesLogin {
            role: role.to_string(),
            sa_token_path: sa_token_path.to_string(),
        }));
        self
    }

    #[must_use]
    pub fn kv_version(&self) -> KvVersion {
        self.kv_version
    }

    #[must_use]
    pub fn mount_path(&self) -> &str {
        &self.mount_path
    }

    fn data_url(&self, path: &str) -> String {
        data_url(&self.address, &self.mount_path, self.kv_version, path)
    }

    /// Send the request built by `request` with the current token
    ///
    /// A rejected token is renewed and the request sent once more.
    async fn send<F>(
        &self,
        operation: &'static str,
        tracker: &OperationTracker,
        request: F,
    ) -> Result<reqwest::Response, VaultError>
    where
        F: Fn(&str) -> reqwest::RequestBuilder,
    {
        let token = self.token.read().await.clone();
        let response = dispatch(operation, tracker, request(token.as_str())).await?;
        if self.login.is_none() || !is_auth_status(response.status().as_u16()) {
            return Ok(response);
        }

        let fresh = match self.renew_token(&token).await {
            Ok(fresh) => fresh,
            Err(e) => {
                tracker.record_error(operation, &e.to_string());
                return Err(e);
            }
        };
        dispatch(operation, tracker, request(fresh.as_str())).await
    }

    /// Replace `stale` with a freshly issued token
    ///
    /// Callers that lost the race get the token the winner already fetched.
    async fn renew_token(&self, stale: &str) -> Result<Zeroizing<String>, VaultError> {
        let mut token = self.token.write().await;
        if token.as_str() != stale {
            return Ok(token.clone());
        }
        let Some(login) = self.login.as_deref() else {
            return Ok(token.clone());
        };
        let fresh = login.login(&self.http, &self.address).await?;
        *token = fresh.clone();
        info!(
            vault.address = self.address.as_str(),
            vault.role = login.role.as_str(),
            "Renewed rejected vault token"
        );
        Ok(fresh)
    }

    /// Read the key/value blob at `path`; `None` when nothing is stored there
    pub async fn read(&self, path: &str) -> Result<Option<HashMap<String, String>>, VaultError> {
        let span = info_span!("vault.kv.read", vault.mount = %self.mount_path, vault.path = path);
        let tracker = OperationTracker::new(SERVICE, span.clone());

        async move {
            let url = self.data_url(path);
            let response = self
                .send("read", &tracker, |token| {
                    self.http.get(&url).header("X-Vault-Token", token)
                })
                .await?;

            if response.status().as_u16() == 404 {
                tracker.record_success("read");
                return Ok(None);
            }

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                tracker.record_error("read", &body);
                return Err(VaultError::Status {
                    status,
                    path: path.to_string(),
                    body,
                });
            }

            let body: serde_json::Value = response
                .json()
                .await
                .map_err(|e| VaultError::MalformedResponse(e.to_string()))?;
            tracker.record_success("read");
            Ok(extract_secret_data(&body, self.kv_version))
        }
        .instrument(span)
        .await
    }

    /// Write the key/value blob at `path`, replacing any previous value
    pub async fn write(&self, path: &str, data: &HashMap<String, String>) -> Result<(), VaultError> {
        let span = info_span!("vault.kv.write", vault.mount = %self.mount_path, vault.path = path);
        let tracker = OperationTracker::new(SERVICE, span.clone());

        async move {
            let body = match self.kv_version {
                KvVersion::V1 => serde_json::json!(data),
                KvVersion::V2 => serde_json::json!({ "data": data }),
            };

            let url = self.data_url(path);
            let response = self
                .send("write", &tracker, |token| {
                    self.http
                        .post(&url)
                        .header("X-Vault-Token", token)
                        .json(&body)
                })
                .await?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                tracker.record_error("write", &body);
                return Err(VaultError::Status {
                    status,
                    path: path.to_string(),
                    body,
                });
            }

            tracker.record_success("write");
            Ok(())
        }
        .instrument(span)
        .await
    }

    /// Delete the blob at `path`; deleting an absent path succeeds
    ///
    /// On KV v2 this deletes the latest version.
    pub async fn delete(&self, path: &str) -> Result<(), VaultError> {
        let span = info_span!("vault.kv.delete", vault.mount = %self.mount_path, vault.path = path);
        let tracker = OperationTracker::new(SERVICE, span.clone());

        async move {
            let url = self.data_url(path);
            let response = self
                .send("delete", &tracker, |token| {
                    self.http.delete(&url).header("X-Vault-Token", token)
                })
                .await?;

            let status = response.status();
            if status.is_success() || status.as_u16() == 404 {
                tracker.record_success("delete");
                return Ok(());
            }

            let body = response.text().await.unwrap_or_default();
            tracker.record_error("delete", &body);
            Err(VaultError::Status {
                status: status.as_u16(),
                path: path.to_string(),
                body,
            })
        }
        .instrument(span)
        .await
    }
}

async fn dispatch(
    operation: &'static str,
    tracker: &OperationTracker,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, VaultError> {
    match request.send().await {
        Ok(response) => Ok(response),
        Err(e) => {
            tracker.record_error(operation, &e.to_string());
            Err(e.into())
        }
    }
}

fn build_http_client() -> Result<reqwest::Client, VaultError> {
    Ok(reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?)
}

fn data_url(address: &str, mount_path: &str, kv_version: KvVersion, path: &str) -> String {
    let address = address.trim_end_matches('/');
    let mount = mount_path.trim_matches('/');
    let path = path.trim_start_matches('/');
    match kv_version {
        KvVersion::V1 => format!("{address}/v1/{mount}/{path}"),
        KvVersion::V2 => format!("{address}/v1/{mount}/data/{path}"),
    }
}

/// Pull the stored key/value pairs out of a read response
///
/// Non-string values are rendered as JSON text.
fn extract_secret_data(body: &serde_json::Value, kv_version: KvVersion) -> Option<HashMap<String, String>> {
    let data = match kv_version {
        KvVersion::V1 => body.get("data"),
        KvVersion::V2 => body.get("data").and_then(|d| d.get("data")),
    }?;

    let object = data.as_object()?;
    Some(
        object
            .iter()
            .map(|(k, v)| {
                let value = v.as_str().map_or_else(|| v.to_string(), str::to_string);
                (k.clone(), value)
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_version_parse() {
        assert_eq!("1".parse::<KvVersion>().unwrap(), KvVersion::V1);
        assert_eq!("2".parse::<KvVersion>().unwrap(), KvVersion::V2);
        assert!(matches!(
            "3".parse::<KvVersion>(),
            Err(VaultError::UnsupportedKvVersion(v)) if v == "3"
        ));
    }

    #[test]
    fn test_data_url_per_version() {
        assert_eq!(
            data_url("http://vault:8200/", "secret", KvVersion::V1, "radosgw/prod1/users/alice"),
            "http://vault:8200/v1/secret/radosgw/prod1/users/alice"
        );
        assert_eq!(
            data_url("http://vault:8200", "/secret/", KvVersion::V2, "/radosgw/prod1/users/alice"),
            "http://vault:8200/v1/secret/data/radosgw/prod1/users/alice"
        );
    }

    #[test]
    fn test_extract_secret_data_v1() {
        let body = serde_json::json!({ "data": { "access_key": "AK", "secret_key": "SK" } });
        let data = extract_secret_data(&body, KvVersion::V1).unwrap();
        assert_eq!(data["access_key"], "AK");
        assert_eq!(data["secret_key"], "SK");
    }

    #[test]
    fn test_extract_secret_data_v2_envelope() {
        let body = serde_json::json!({
            "data": {
                "data": { "access_key": "AK", "secret_key": "SK" },
                "metadata": { "version": 3 }
            }
        });
        let data = extract_secret_data(&body, KvVersion::V2).unwrap();
        assert_eq!(data.len(), 2);
        assert_eq!(data["secret_key"], "SK");
    }

    #[test]
    fn test_extract_secret_data_v2_deleted_version() {
        let body = serde_json::json!({ "data": { "data": null, "metadata": { "deletion_time": "x" } } });
        assert!(extract_secret_data(&body, KvVersion::V2).is_none());
    }

    #[test]
    fn test_debug_redacts_token() {
        let client = VaultClient::with_token("http://vault:8200", "s.supersecret", "secret", KvVersion::V2)
            .unwrap();
        let rendered = format!("{client:?}");
        assert!(!rendered.contains("supersecret"));
    }

    #[test]
    fn test_retryable_classification() {
        let server_error = VaultError::Status {
            status: 503,
            path: "p".to_string(),
            body: String::new(),
        };
        assert!(server_error.is_retryable());

        let bad_request = VaultError::Status {
            status: 400,
            path: "p".to_string(),
            body: String::new(),
        };
        assert!(!bad_request.is_retryable());
        assert!(!VaultError::UnsupportedKvVersion("9".to_string()).is_retryable());
    }
}
