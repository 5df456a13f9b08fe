//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Name used as field manager and event reporter
pub const CONTROLLER_NAME: &str = "radosgw-user-controller";

/// API group of all custom resources served by this controller
pub const API_GROUP: &str = "radosgw.io";

/// Finalizer held on a CephUser while its RADOS Gateway user exists
pub const CEPHUSER_FINALIZER: &str = "cephuser-in-use.radosgw.io";

/// Finalizer held on a Bucket while its remote bucket exists
pub const BUCKET_FINALIZER: &str = "bucket.radosgw.io/cleanup";

/// Every ProviderConfig name carries this prefix; the remainder is the backend name
pub const BACKEND_NAME_PREFIX: &str = "ceph-";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Default poll interval between successful reconciliations (seconds)
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Default deadline for a single reconciliation (seconds)
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 30;

/// Default number of records reconciled simultaneously
pub const DEFAULT_MAX_CONCURRENT_RECONCILIATIONS: u16 = 10;

/// Default worker count for the client registry warm-up pass
pub const DEFAULT_REGISTRY_INIT_CONCURRENCY: usize = 8;

/// Initial capacity of the client registry map
pub const REGISTRY_START_CAPACITY: usize = 1000;

/// Fibonacci backoff bounds for failed reconciliations (minutes)
pub const DEFAULT_BACKOFF_MIN_MINUTES: u64 = 1;
pub const DEFAULT_BACKOFF_MAX_MINUTES: u64 = 10;

/// Admin vault defaults (the privileged connection used to fetch admin keys)
pub const DEFAULT_ADMIN_VAULT_ADDR: &str = "http://localhost:8200";
pub const DEFAULT_ADMIN_VAULT_ROLE: &str = "radosgw-ceph-admin";
pub const DEFAULT_ADMIN_VAULT_MOUNT: &str = "secret";
pub const DEFAULT_ADMIN_VAULT_KV_VERSION: &str = "2";

/// Projected service-account token used for Vault Kubernetes auth
pub const DEFAULT_SA_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

/// Default namespace the controller runs in (legacy credential Secrets land here)
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "radosgw-system";

/// Keys used in credential blobs, both in Vault and in Kubernetes Secrets
pub const ACCESS_KEY_FIELD: &str = "access_key";
pub const SECRET_KEY_FIELD: &str = "secret_key";

/// Suffix of the legacy per-user credential Secret name
pub const CREDENTIALS_SECRET_SUFFIX: &str = "-credentials";

/// Generated key lengths
pub const ACCESS_KEY_LENGTH: usize = 20;
pub const SECRET_KEY_LENGTH: usize = 40;

/// Region used for S3 data-plane clients and admin request signing
pub const DEFAULT_S3_REGION: &str = "us-east-1";
pub const ADMIN_SIGNING_REGION: &str = "default";
