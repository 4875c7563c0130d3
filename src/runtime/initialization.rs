//! # Initialization
//!
//! Agent startup: rustls setup, tracing, metrics, server startup, hub and
//! member client setup, and construction of the reconciler.

use crate::config::{create_shared_config, ControllerConfig, SharedServerConfig};
use crate::controller::apply::KubeMemberClient;
use crate::controller::associations::{KubeMemberStatusStore, NamespaceAssociationTracker};
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::observability;
use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Components built at startup
pub struct InitializationResult {
    /// Hub cluster client
    pub hub: Client,
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    /// Configuration snapshot taken at startup
    pub config: ControllerConfig,
    pub server_config: SharedServerConfig,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("member_cluster", &self.config.member_cluster_name)
            .field("hub_namespace", &self.config.hub_namespace)
            .field(
                "server_ready",
                &self
                    .server_state
                    .is_ready
                    .load(std::sync::atomic::Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

/// Initialize the agent runtime
///
/// The HTTP server is started here and stops when `shutdown` is cancelled.
/// Readiness is reported once the Work watch has synced.
pub async fn initialize(shutdown: CancellationToken) -> Result<InitializationResult> {
    // Required for rustls 0.23+ when no default provider is selected by features
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    let (controller_config, server_config) = create_shared_config();
    let config = controller_config.read().await.clone();

    init_tracing(&config);
    info!("Starting fleet work applier");
    info!(
        member_cluster = %config.member_cluster_name,
        hub_namespace = %config.hub_namespace,
        workers = config.workers,
        "Loaded configuration"
    );

    if config.enable_metrics {
        observability::metrics::register_metrics()?;
    }

    let server_state = Arc::new(ServerState::default());
    let server_port = server_config.read().await.metrics_port;
    let server_state_clone = Arc::clone(&server_state);
    tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone, shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    let hub = hub_client(&config).await?;
    let member = Client::try_default()
        .await
        .context("Failed to create member cluster client")?;

    let store = Arc::new(KubeMemberStatusStore::new(
        hub.clone(),
        config.hub_namespace.clone(),
        config.member_cluster_name.clone(),
    ));
    let associations = Arc::new(NamespaceAssociationTracker::new(
        store,
        config.max_namespace_labels,
        config.status_conflict_retries,
    ));
    let member_client = Arc::new(KubeMemberClient::new(member.clone()));
    let reconciler = Arc::new(Reconciler::new(
        hub.clone(),
        member,
        member_client,
        associations,
        &config,
    ));

    info!("Agent initialized, starting watch loop...");
    Ok(InitializationResult {
        hub,
        reconciler,
        server_state,
        config,
        server_config,
    })
}

fn init_tracing(config: &ControllerConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("fleet_work_applier={}", config.log_level.to_lowercase()).into()
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    // Init can only fail when a subscriber is already installed
    let _ = if config.log_format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Client for the hub cluster
///
/// Uses `HUB_KUBECONFIG` when set; otherwise the default configuration, for
/// agents whose hub and member are the same cluster.
async fn hub_client(config: &ControllerConfig) -> Result<Client> {
    let Some(path) = &config.hub_kubeconfig else {
        return Client::try_default()
            .await
            .context("Failed to create hub cluster client");
    };

    let kubeconfig = Kubeconfig::read_from(path)
        .with_context(|| format!("Failed to read hub kubeconfig {path}"))?;
    let client_config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .context("Failed to load hub kubeconfig")?;
    Client::try_from(client_config).context("Failed to create hub cluster client")
}
