//! # Vault Authentication
//!
//! Token acquisition for a vault connection. Kubernetes service-account auth
//! in-cluster, or a static token in local dev mode when both `VAULT_TOKEN`
//! and `VAULT_ADDR` are set.
//!
//! A Kubernetes login is kept with the connection so an expired token can be
//! replaced by logging in again with the current service-account token.

use crate::vault::VaultError;
use serde::Deserialize;
use tracing::{debug, info};
use zeroize::Zeroizing;

#[derive(Debug, Deserialize)]
struct LoginResponse {
    auth: Option<LoginAuth>,
}

#[derive(Debug, Deserialize)]
struct LoginAuth {
    client_token: String,
}

/// Address and token to use for one vault connection
#[derive(Debug)]
pub(crate) struct ResolvedAuth {
    pub address: String,
    pub token: Zeroizing<String>,
    /// How to obtain a fresh token; `None` for a static dev-mode token
    pub login: Option<KubernetesLogin>,
}

/// Kubernetes auth parameters of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct KubernetesLogin {
    pub role: String,
    pub sa_token_path: String,
}

impl KubernetesLogin {
    /// Log in with the service-account token currently on disk
    ///
    /// The file is re-read on every login since the kubelet rotates it.
    pub async fn login(
        &self,
        http: &reqwest::Client,
        address: &str,
    ) -> Result<Zeroizing<String>, VaultError> {
        let jwt = tokio::fs::read_to_string(&self.sa_token_path)
            .await
            .map_err(|source| VaultError::TokenFile {
                path: self.sa_token_path.clone(),
                source,
            })?;
        let jwt = Zeroizing::new(jwt.trim().to_string());
        login_kubernetes(http, address, &self.role, &jwt).await
    }
}

/// Dev-mode override, present when both `VAULT_TOKEN` and `VAULT_ADDR` are set
pub(crate) fn dev_mode_override() -> Option<ResolvedAuth> {
    let token = std::env::var("VAULT_TOKEN").ok().filter(|t| !t.is_empty())?;
    let address = std::env::var("VAULT_ADDR").ok().filter(|a| !a.is_empty())?;
    Some(ResolvedAuth {
        address,
        token: Zeroizing::new(token),
        login: None,
    })
}

/// Resolve the token for a connection to `address` under `role`
pub(crate) async fn resolve(
    http: &reqwest::Client,
    address: &str,
    role: &str,
    sa_token_path: &str,
) -> Result<ResolvedAuth, VaultError> {
    if let Some(dev) = dev_mode_override() {
        info!(
            vault.address = dev.address.as_str(),
            "Using local dev mode as 'VAULT_TOKEN' and 'VAULT_ADDR' are set"
        );
        return Ok(dev);
    }

    let login = KubernetesLogin {
        role: role.to_string(),
        sa_token_path: sa_token_path.to_string(),
    };
    let token = login.login(http, address).await?;
    Ok(ResolvedAuth {
        address: address.to_string(),
        token,
        login: Some(login),
    })
}

/// Exchange a service-account JWT for a vault token via the Kubernetes auth method
pub(crate) async fn login_kubernetes(
    http: &reqwest::Client,
    address: &str,
    role: &str,
    jwt: &str,
) -> Result<Zeroizing<String>, VaultError> {
    let url = format!("{}/v1/auth/kubernetes/login", address.trim_end_matches('/'));
    debug!(vault.address = address, vault.role = role, "vault.login.kubernetes");

    let response = http
        .post(&url)
        .json(&serde_json::json!({ "role": role, "jwt": jwt }))
        .send()
        .await?;

    if !response.status().is_success() {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        return Err(VaultError::Login(format!(
            "kubernetes login for role '{role}' failed ({status}): {body}"
        )));
    }

    let login: LoginResponse = response
        .json()
        .await
        .map_err(|e| VaultError::MalformedResponse(format!("login response: {e}")))?;

    login
        .auth
        .map(|auth| Zeroizing::new(auth.client_token))
        .ok_or_else(|| {
            VaultError::Login("no auth info was returned after login".to_string())
        })
}
