//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::constants::{
    DEFAULT_ADMIN_VAULT_ADDR, DEFAULT_ADMIN_VAULT_KV_VERSION, DEFAULT_ADMIN_VAULT_MOUNT,
    DEFAULT_ADMIN_VAULT_ROLE, DEFAULT_BACKOFF_MAX_MINUTES, DEFAULT_BACKOFF_MIN_MINUTES,
    DEFAULT_CONTROLLER_NAMESPACE, DEFAULT_MAX_CONCURRENT_RECONCILIATIONS, DEFAULT_METRICS_PORT,
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_RECONCILE_TIMEOUT_SECS, DEFAULT_REGISTRY_INIT_CONCURRENCY,
    DEFAULT_SA_TOKEN_PATH,
};
use std::time::Duration;

/// Output format of the tracing subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Text,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("text") {
            Self::Text
        } else {
            Self::Json
        }
    }
}

/// Settings of the privileged vault connection used to fetch each backend's
/// admin credentials before any user-level work begins
#[derive(Debug, Clone)]
pub struct AdminVaultSettings {
    /// When false, ProviderConfigs with a `Vault` credential source fail to connect
    pub enabled: bool,
    pub address: String,
    /// Kubernetes auth role
    pub role: String,
    pub mount_path: String,
    /// KV engine version, "1" or "2"
    pub kv_version: String,
}

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Requeue interval after a successful reconciliation (seconds)
    pub poll_interval_secs: u64,
    /// Deadline for one reconciliation; in-flight remote calls are dropped when it passes
    pub reconcile_timeout_secs: u64,
    /// Maximum concurrent reconciliations per controller
    pub max_concurrent_reconciliations: u16,
    /// Worker pool size of the client registry warm-up pass
    pub registry_init_concurrency: usize,
    /// Fibonacci backoff lower bound (minutes)
    pub backoff_min_minutes: u64,
    /// Fibonacci backoff upper bound (minutes)
    pub backoff_max_minutes: u64,
    /// Namespace the controller is deployed in
    /// Legacy credential Secrets are written here
    pub controller_namespace: String,
    /// Service-account token presented to Vault's Kubernetes auth method
    pub sa_token_path: String,
    pub admin_vault: AdminVaultSettings,
    /// HTTP port for `/metrics`, `/healthz` and `/readyz`
    pub metrics_port: u16,
    /// Global log filter used when `RUST_LOG` is unset
    pub log_level: String,
    pub log_format: LogFormat,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            reconcile_timeout_secs: DEFAULT_RECONCILE_TIMEOUT_SECS,
            max_concurrent_reconciliations: DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            registry_init_concurrency: DEFAULT_REGISTRY_INIT_CONCURRENCY,
            backoff_min_minutes: DEFAULT_BACKOFF_MIN_MINUTES,
            backoff_max_minutes: DEFAULT_BACKOFF_MAX_MINUTES,
            controller_namespace: DEFAULT_CONTROLLER_NAMESPACE.to_string(),
            sa_token_path: DEFAULT_SA_TOKEN_PATH.to_string(),
            admin_vault: AdminVaultSettings {
                enabled: true,
                address: DEFAULT_ADMIN_VAULT_ADDR.to_string(),
                role: DEFAULT_ADMIN_VAULT_ROLE.to_string(),
                mount_path: DEFAULT_ADMIN_VAULT_MOUNT.to_string(),
                kv_version: DEFAULT_ADMIN_VAULT_KV_VERSION.to_string(),
            },
            metrics_port: DEFAULT_METRICS_PORT,
            log_level: "radosgw_user_controller=info".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self {
            poll_interval_secs: env_var_or_default("POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL_SECS),
            reconcile_timeout_secs: env_var_or_default(
                "RECONCILE_TIMEOUT_SECS",
                DEFAULT_RECONCILE_TIMEOUT_SECS,
            ),
            max_concurrent_reconciliations: env_var_or_default(
                "MAX_CONCURRENT_RECONCILIATIONS",
                DEFAULT_MAX_CONCURRENT_RECONCILIATIONS,
            ),
            registry_init_concurrency: env_var_or_default(
                "REGISTRY_INIT_CONCURRENCY",
                DEFAULT_REGISTRY_INIT_CONCURRENCY,
            )
            .max(1),
            backoff_min_minutes: env_var_or_default(
                "BACKOFF_MIN_MINUTES",
                DEFAULT_BACKOFF_MIN_MINUTES,
            ),
            backoff_max_minutes: env_var_or_default(
                "BACKOFF_MAX_MINUTES",
                DEFAULT_BACKOFF_MAX_MINUTES,
            ),
            controller_namespace: env_var_or_default_str(
                "POD_NAMESPACE",
                DEFAULT_CONTROLLER_NAMESPACE,
            ),
            sa_token_path: env_var_or_default_str("SA_TOKEN_PATH", DEFAULT_SA_TOKEN_PATH),
            admin_vault: AdminVaultSettings {
                enabled: env_var_or_default_bool("ADMIN_VAULT_ENABLED", true),
                address: env_var_or_default_str("VAULT_CEPH_ADMIN_ADDR", DEFAULT_ADMIN_VAULT_ADDR),
                role: env_var_or_default_str("VAULT_CEPH_ADMIN_ROLE", DEFAULT_ADMIN_VAULT_ROLE),
                mount_path: env_var_or_default_str(
                    "VAULT_CEPH_ADMIN_MOUNT",
                    DEFAULT_ADMIN_VAULT_MOUNT,
                ),
                kv_version: env_var_or_default_str(
                    "VAULT_CEPH_ADMIN_KV_VERSION",
                    DEFAULT_ADMIN_VAULT_KV_VERSION,
                ),
            },
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            log_level: env_var_or_default_str("LOG_LEVEL", "radosgw_user_controller=info"),
            log_format: LogFormat::parse(&env_var_or_default_str("LOG_FORMAT", "json")),
        }
    }

    /// Get poll interval duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Get reconcile deadline duration
    pub fn reconcile_timeout(&self) -> Duration {
        Duration::from_secs(self.reconcile_timeout_secs)
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as boolean or return default
fn env_var_or_default_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| parse_bool(&v))
        .unwrap_or(default)
}

fn parse_bool(value: &str) -> bool {
    let v_lower = value.to_lowercase();
    v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
}

/// Read environment variable as string or return default
///
/// Empty values count as unset.
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}
