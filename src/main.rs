//! # RADOS Gateway User Controller
//!
//! Operator process: reconciles `CephUser` and `Bucket` resources across all
//! namespaces of the cluster.
//!
//! Settings come from the environment (see `ControllerConfig::from_env`); the
//! flags below override the values operators most often tune by hand.

use clap::Parser;
use radosgw_user_controller::config::ControllerConfig;
use radosgw_user_controller::runtime::{initialize, run_watch_loop};

#[derive(Debug, Parser)]
#[command(name = "radosgw-user-controller", version, about)]
struct Cli {
    /// Requeue interval after a successful reconciliation, in seconds
    #[arg(long)]
    poll_interval_secs: Option<u64>,

    /// Port serving /metrics, /healthz and /readyz
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Namespace the controller runs in; legacy credential Secrets are written here
    #[arg(long)]
    namespace: Option<String>,
}

impl Cli {
    fn apply(self, mut config: ControllerConfig) -> ControllerConfig {
        if let Some(secs) = self.poll_interval_secs {
            config.poll_interval_secs = secs;
        }
        if let Some(port) = self.metrics_port {
            config.metrics_port = port;
        }
        if let Some(namespace) = self.namespace {
            config.controller_namespace = namespace;
        }
        config
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().apply(ControllerConfig::from_env());

    let init = initialize(config).await?;
    run_watch_loop(init.client, init.reconciler, init.server_state).await
}
