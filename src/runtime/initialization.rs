//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, the privileged admin vault connection, client registry
//! warm-up and Kubernetes client setup.

use crate::backend::{BackendConnector, BackendResolver};
use crate::config::{ControllerConfig, LogFormat};
use crate::constants::CONTROLLER_NAME;
use crate::controller::bucket::{BucketEngine, KubeOwnerLookup};
use crate::controller::cephuser::CephUserEngine;
use crate::controller::events::{EventPublisher, KubeEventPublisher};
use crate::controller::records::{KubeRecordStore, RecordStore};
use crate::controller::server::{start_server, ServerState};
use crate::controller::types::Reconciler;
use crate::credentials::AdminCredentialsExtractor;
use crate::crd::{Bucket, CephUser};
use crate::observability;
use crate::registry::{BackendClientFactory, ClientFactory, ClientRegistry};
use crate::vault::{KvVersion, VaultClient, VaultSettings};
use anyhow::{Context, Result};
use kube::api::{Api, ListParams};
use kube::Client;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// How long to wait for the HTTP server to bind
const SERVER_STARTUP_TIMEOUT: Duration = Duration::from_secs(10);
const SERVER_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// Reconciler context
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.ready())
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - The admin vault connection (a failure here aborts startup)
/// - Client registry warm-up
/// - Reconciler setup
pub async fn initialize(config: ControllerConfig) -> Result<InitializationResult> {
    // Required for rustls 0.23+ when no default provider is set via features.
    // Must run before anything opens a TLS connection.
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        // Only fails when a provider is already installed
        eprintln!("rustls crypto provider already installed");
    }

    init_tracing(&config);

    info!("Starting RADOS Gateway user controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_listening(&server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let admin_vault = connect_admin_vault(&config).await?;
    let extractor = AdminCredentialsExtractor::new(client.clone(), admin_vault);
    let backends: Arc<dyn BackendResolver> = Arc::new(BackendConnector::new(
        client.clone(),
        extractor,
        &config.controller_namespace,
        &config.sa_token_path,
    ));
    let factory: Arc<dyn ClientFactory<aws_sdk_s3::Client>> =
        Arc::new(BackendClientFactory::new(Arc::clone(&backends)));

    let registry = Arc::new(ClientRegistry::new());
    warm_up_registry(&client, &registry, factory.as_ref(), &config).await?;

    let events: Arc<dyn EventPublisher> =
        Arc::new(KubeEventPublisher::new(client.clone(), CONTROLLER_NAME));
    let user_records: Arc<dyn RecordStore<CephUser>> =
        Arc::new(KubeRecordStore::<CephUser>::new(client.clone()));
    let bucket_records: Arc<dyn RecordStore<Bucket>> =
        Arc::new(KubeRecordStore::<Bucket>::new(client.clone()));

    let users = CephUserEngine::new(
        backends,
        user_records,
        Arc::clone(&events),
        Arc::clone(&registry),
        config.poll_interval(),
    );
    let buckets = BucketEngine::new(
        registry,
        factory,
        Arc::new(KubeOwnerLookup::new(client.clone())),
        bucket_records,
        events,
        config.poll_interval(),
    );
    let reconciler = Arc::new(Reconciler::new(users, buckets, config));

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        reconciler,
        server_state,
    })
}

fn init_tracing(config: &ControllerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_level.as_str().into());

    let result = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
    };
    if let Err(e) = result {
        eprintln!("Tracing subscriber already initialized: {e}");
    }
}

/// Connect the privileged vault holding backend admin keys
///
/// When the admin vault is disabled, ProviderConfigs sourcing admin keys from
/// vault fail to connect instead.
async fn connect_admin_vault(config: &ControllerConfig) -> Result<Option<VaultClient>> {
    let admin = &config.admin_vault;
    if !admin.enabled {
        warn!("Admin vault disabled; only Environment and Secret credential sources are usable");
        return Ok(None);
    }

    let kv_version: KvVersion = admin
        .kv_version
        .parse()
        .context("Invalid VAULT_CEPH_ADMIN_KV_VERSION")?;
    let settings = VaultSettings {
        address: admin.address.clone(),
        role: admin.role.clone(),
        mount_path: admin.mount_path.clone(),
        kv_version,
    };

    let client = VaultClient::connect(&settings, &config.sa_token_path)
        .await
        .with_context(|| format!("Failed to authenticate to admin vault at {}", admin.address))?;
    info!(
        vault.address = admin.address.as_str(),
        vault.mount = admin.mount_path.as_str(),
        "Connected to admin vault"
    );
    Ok(Some(client))
}

/// Load a client for every CephUser that already has credentials
///
/// Individual failures are logged and left for on-demand builds; only a
/// failure to list the records aborts startup.
async fn warm_up_registry(
    client: &Client,
    registry: &ClientRegistry,
    factory: &dyn ClientFactory<aws_sdk_s3::Client>,
    config: &ControllerConfig,
) -> Result<()> {
    let users: Api<CephUser> = Api::all(client.clone());
    let records = users
        .list(&ListParams::default())
        .await
        .context("Failed to list CephUser resources; is the CRD installed?")?;

    let report = registry
        .init(records.items, factory, config.registry_init_concurrency)
        .await;
    if !report.is_complete() {
        for failure in &report.failed {
            warn!(
                user.uid = failure.uid.as_str(),
                error = failure.error.as_str(),
                "Client will be built on first use"
            );
        }
    }
    Ok(())
}

/// Wait for the HTTP server to bind its listener
async fn wait_for_server_listening(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_listening.load(Ordering::Relaxed) {
            info!("HTTP server is accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > SERVER_STARTUP_TIMEOUT {
            return Err(anyhow::anyhow!(
                "HTTP server failed to start listening within {} seconds",
                SERVER_STARTUP_TIMEOUT.as_secs()
            ));
        }

        tokio::time::sleep(SERVER_POLL_INTERVAL).await;
    }
}
