mod config;
mod network;
mod pairing;
mod storage;

use std::io::BufReader;
use std::sync::mpsc;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use provision_core::{
    BootstrapController, Collaborators, ConfigHandlers, ConfigServiceControl, LogRenderer,
    NetworkProfileStore, NotificationChannel, Reboot, SecretStore,
};
use provision_web::{ConfigService, ConfigState, MdnsDiscovery};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Args;
use crate::network::HostNetwork;
use crate::pairing::ConsolePairing;
use crate::storage::FileStorage;

/// Ends the process; the service manager starts a fresh agent.
struct ProcessRestart;

impl Reboot for ProcessRestart {
    fn restart(&self) {
        tracing::info!("Exiting for restart");
        std::process::exit(0);
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,provision_core=debug,provision_web=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = args.load_config()?;
    let state_dir = args.state_dir()?;
    let bind = args.bind_addr(&config);

    tracing::info!("Provisioning agent starting...");
    tracing::info!("   State:          {}", state_dir.display());
    tracing::info!("   Config service: http://{}", bind);

    let runtime = tokio::runtime::Runtime::new().context("Failed to start the tokio runtime")?;

    let secret_storage = FileStorage::open(&state_dir, provision_core::secrets::SECRETS_NAMESPACE)
        .context("Failed to open the secret namespace")?;
    let network_storage = FileStorage::open(&state_dir, provision_core::network::NETWORK_NAMESPACE)
        .context("Failed to open the network namespace")?;

    let secrets = Arc::new(SecretStore::new(
        Box::new(secret_storage),
        config.default_api_uri.clone(),
    ));
    let notifications = Arc::new(NotificationChannel::new());
    let state = ConfigState::new(
        ConfigHandlers::new(secrets.clone(), notifications.clone()),
        Arc::new(ProcessRestart),
    );
    let service = ConfigService::new(
        bind,
        state,
        Box::new(MdnsDiscovery::new(config.discovery.clone())),
        runtime.handle().clone(),
    );

    let (events, network_events) = mpsc::channel();
    let collaborators = Collaborators {
        pairing: Box::new(ConsolePairing::new(BufReader::new(std::io::stdin()))),
        join: Box::new(HostNetwork::new(events)),
        network_events,
        reset: Box::new(args.reset),
        config_service: Box::new(service),
        renderer: Box::new(LogRenderer),
    };

    let controller = BootstrapController::new(
        config,
        secrets.clone(),
        NetworkProfileStore::new(Box::new(network_storage)),
        notifications,
        collaborators,
    );
    let mut provisioned = controller.run()?;

    let remote = secrets.remote_credentials()?;
    tracing::info!("Ready!");
    tracing::info!("   Endpoint:       {}", remote.api_uri);
    if provisioned.degraded {
        tracing::warn!("   Network join was degraded before an address was assigned");
    }

    runtime.block_on(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    });
    tracing::info!("Received Ctrl+C, shutting down...");

    provisioned.config_service.stop()?;
    tracing::info!("Shutdown complete");
    Ok(())
}
