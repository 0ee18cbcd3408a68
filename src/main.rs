//! Swap Orchestrator - session state machine for swaps and cross-chain transfers
//!
//! Classifies a selected currency pair, builds and submits the origin
//! transaction, and tracks cross-chain delivery until every step settles.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};

mod abi;
mod api;
mod chain;
mod config;
mod coordination;
mod delivery;
mod encoder;
mod error;
mod events;
mod metrics;
mod quote;
mod state;
mod transaction;
mod tx;

use chain::ChainManager;
use config::Settings;
use coordination::{CallBuilder, ExecutionCoordinator, Notifier, Session};
use encoder::EvmCallEncoder;
use metrics::MetricsServer;
use quote::UniswapQuoter;
use state::ProgressStore;
use transaction::BridgeRegistry;
use tx::LocalWalletSession;

const HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting Swap Orchestrator v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration for {} chains and {} bridge routes",
        settings.enabled_chains().len(),
        settings.bridges.len()
    );

    // Initialize metrics server
    let metrics_server = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(server)
    } else {
        None
    };

    // Chain connections and read handles
    let chain_manager = Arc::new(ChainManager::new(&settings)?);
    let readers = chain_manager.readers();
    info!("Chain connections initialized");

    // Collaborators
    let registry = Arc::new(BridgeRegistry::from_settings(&settings)?);
    let oracles = delivery::build_oracles(&settings, &readers)?;
    let quoter = Arc::new(UniswapQuoter::from_settings(&settings, readers.clone())?);
    let contracts = encoder::load_contracts(&settings)?;
    let encoder = Arc::new(EvmCallEncoder::new(
        contracts.clone(),
        registry.clone(),
        readers.clone(),
    ));
    let wallet = Arc::new(LocalWalletSession::new(chain_manager.clone(), &settings)?);

    // Session state
    let store = Arc::new(ProgressStore::new());
    let notifier = Arc::new(Notifier::new(settings.session.notification_history));
    let coordinator = Arc::new(ExecutionCoordinator::new(
        wallet,
        store.clone(),
        notifier.clone(),
        oracles,
        readers.clone(),
        Duration::from_millis(settings.session.tracker_poll_interval_ms),
    ));
    let builder = CallBuilder::new(
        quoter,
        encoder,
        settings.session.slippage_bps,
        settings.session.swap_deadline_secs,
    );
    let session = Arc::new(Session::new(
        registry,
        builder,
        coordinator.clone(),
        store,
        notifier,
        readers,
        contracts,
    ));
    info!("Session initialized");

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let state = api::AppState {
            session: session.clone(),
            chain_manager: chain_manager.clone(),
        };
        async move {
            if let Err(e) = api::run_server(config, state).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = metrics_server.map(|server| {
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        })
    });

    // Start delivery-event loop
    let coordinator_handle = tokio::spawn({
        let coordinator = coordinator.clone();
        async move {
            if let Err(e) = coordinator.run().await {
                error!("Execution coordinator error: {}", e);
            }
        }
    });

    // Health check loop
    let health_handle = tokio::spawn({
        let chain_manager = chain_manager.clone();
        async move {
            loop {
                tokio::time::sleep(HEALTH_CHECK_INTERVAL).await;

                let health = chain_manager.health_check().await;
                for (chain_id, healthy) in &health {
                    if !healthy {
                        warn!("Chain {} health check failed", chain_id);
                    }
                }
                metrics::record_health_check(health.iter().all(|(_, healthy)| *healthy));
            }
        }
    });

    info!("Swap Orchestrator is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    // Graceful shutdown
    coordinator.stop().await;

    // Abort background tasks
    api_handle.abort();
    coordinator_handle.abort();
    health_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Swap Orchestrator stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,swap_orchestrator=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
