//! Lading order-to-shipment synchronization service.
//!
//! Wires the platform clients, the per-stream sync pipeline, the
//! webhook server and the polling scheduler, and coordinates graceful
//! startup and shutdown.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use lading_api::{AppState, Config};
use lading_clients::{ClientConfig, OrderPlatformClient, ShippingPlatformClient};
use lading_core::{checkpoint::FileCheckpointStore, time::RealClock};
use lading_mapper::EmptyWeightCatalog;
use lading_sync::{SyncPipeline, TrackingReconciler};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("Starting lading order-to-shipment sync");

    let config = Config::load()?;
    let addr = config.socket_addr()?;
    info!(
        stream = %config.consumer.stream_id,
        upstream = %config.upstream_url,
        downstream = %config.downstream_url,
        poll_interval = config.poll_interval_seconds,
        "Configuration loaded"
    );

    let upstream = Arc::new(
        OrderPlatformClient::new(ClientConfig::new(
            config.upstream_url.clone(),
            config.upstream_api_key.clone(),
        ))
        .context("Failed to build order platform client")?,
    );
    let downstream = Arc::new(
        ShippingPlatformClient::new(ClientConfig::new(
            config.downstream_url.clone(),
            config.downstream_api_key.clone(),
        ))
        .context("Failed to build shipping platform client")?,
    );
    let store = Arc::new(
        FileCheckpointStore::new(&config.checkpoint_dir)
            .context("Failed to open checkpoint directory")?,
    );
    let clock = Arc::new(RealClock::new());

    let pipeline = Arc::new(SyncPipeline::new(
        upstream.clone(),
        downstream.clone(),
        store,
        clock,
        config.consumer.clone(),
        config.selector.clone(),
        config.mapper.clone(),
        Arc::new(EmptyWeightCatalog),
    ));
    let reconciler = Arc::new(TrackingReconciler::new(upstream, downstream));

    let shutdown = CancellationToken::new();

    let server_handle = tokio::spawn({
        let shutdown = shutdown.clone();
        let state = AppState { reconciler };
        async move {
            if let Err(e) = lading_api::start_server(state, addr, shutdown).await {
                error!(error = %e, "Server failed");
            }
        }
    });

    let scheduler_handle = tokio::spawn(lading_api::scheduler::run(
        pipeline,
        Duration::from_secs(config.poll_interval_seconds),
        shutdown.clone(),
    ));

    info!(addr = %addr, "Lading is ready");

    shutdown_signal().await;
    info!("Shutdown signal received, starting graceful shutdown");
    shutdown.cancel();

    // Let the in-flight cycle finish its batch and the server drain.
    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(30)) => {
            info!("Shutdown grace period expired");
        }
        _ = async { let _ = tokio::join!(server_handle, scheduler_handle); } => {
            info!("Server and scheduler stopped");
        }
    }

    info!("Lading shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,lading=debug,tower_http=debug"))
        .expect("Invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer().with_target(true).with_file(true).with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}

/// Waits for CTRL+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received CTRL+C");
        }
        () = terminate => {
            info!("Received SIGTERM");
        }
    }
}
