//! # Credentials
//!
//! Access/secret key pairs: generation, the admin credential extractor, and
//! the stores that persist generated user credentials.
//!
//! - `extractor.rs` - resolves the controller's own admin keys for a backend
//! - `store.rs` - Vault-backed and legacy Secret-backed user credential stores

mod extractor;
mod store;

pub use extractor::AdminCredentialsExtractor;
pub use store::{
    backend_name, build_user_secret_path, CredentialStore, KubeSecretCredentialStore,
    VaultCredentialStore,
};

use crate::constants::{ACCESS_KEY_LENGTH, SECRET_KEY_LENGTH};
use crate::vault::VaultError;
use rand::rngs::OsRng;
use rand::Rng;
use std::fmt;
use thiserror::Error;
use zeroize::Zeroizing;

const ACCESS_KEY_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const SECRET_KEY_CHARSET: &[u8] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

#[derive(Debug, Error)]
pub enum CredentialsError {
    #[error("environment variable '{name}' is not set")]
    MissingEnvironment { name: String },

    #[error("field '{field}' missing from {location}")]
    MissingField { field: String, location: String },

    #[error("field '{field}' in {location} is not valid UTF-8")]
    InvalidUtf8 { field: String, location: String },

    #[error("provider config name '{name}' does not start with 'ceph-'")]
    InvalidBackendName { name: String },

    #[error("admin vault connection is disabled; cannot read '{path}'")]
    AdminVaultUnavailable { path: String },

    #[error("kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error(transparent)]
    Vault(#[from] VaultError),
}

impl CredentialsError {
    /// Whether a later attempt may succeed without a configuration change
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            CredentialsError::Kube(_) => true,
            CredentialsError::Vault(e) => e.is_retryable(),
            // The referenced Secret or env may be created later
            CredentialsError::MissingField { .. } | CredentialsError::MissingEnvironment { .. } => {
                true
            }
            CredentialsError::InvalidUtf8 { .. }
            | CredentialsError::InvalidBackendName { .. }
            | CredentialsError::AdminVaultUnavailable { .. } => false,
        }
    }

    #[must_use]
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, CredentialsError::Vault(e) if e.is_auth_failure())
    }
}

/// An access/secret key pair
///
/// Both halves are wiped from memory on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialPair {
    access_key: Zeroizing<String>,
    secret_key: Zeroizing<String>,
}

impl CredentialPair {
    pub fn new(access_key: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            access_key: Zeroizing::new(access_key.into()),
            secret_key: Zeroizing::new(secret_key.into()),
        }
    }

    #[must_use]
    pub fn access_key(&self) -> &str {
        &self.access_key
    }

    #[must_use]
    pub fn secret_key(&self) -> &str {
        &self.secret_key
    }
}

impl fmt::Debug for CredentialPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPair")
            .field("access_key", &"***")
            .field("secret_key", &"***")
            .finish()
    }
}

/// Generate a fresh pair from the OS random source
#[must_use]
pub fn generate_credential_pair() -> CredentialPair {
    CredentialPair::new(
        random_string(ACCESS_KEY_CHARSET, ACCESS_KEY_LENGTH),
        random_string(SECRET_KEY_CHARSET, SECRET_KEY_LENGTH),
    )
}

fn random_string(charset: &[u8], length: usize) -> String {
    let mut rng = OsRng;
    (0..length)
        .map(|_| char::from(charset[rng.gen_range(0..charset.len())]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_pair_shape() {
        let pair = generate_credential_pair();
        assert_eq!(pair.access_key().len(), ACCESS_KEY_LENGTH);
        assert_eq!(pair.secret_key().len(), SECRET_KEY_LENGTH);
        assert!(pair
            .access_key()
            .bytes()
            .all(|b| ACCESS_KEY_CHARSET.contains(&b)));
        assert!(pair.secret_key().bytes().all(|b| b.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_generated_pairs_differ() {
        let a = generate_credential_pair();
        let b = generate_credential_pair();
        assert_ne!(a, b);
    }

    #[test]
    fn test_debug_is_redacted() {
        let pair = CredentialPair::new("AKIAEXAMPLE", "very-secret");
        let rendered = format!("{pair:?}");
        assert!(!rendered.contains("AKIAEXAMPLE"));
        assert!(!rendered.contains("very-secret"));
    }
}
