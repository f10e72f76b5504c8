//! fleetcap capacity engine
//!
//! Serves reservation, fleet and dashboard traffic over HTTP while the
//! reconciler applies fleet events and the monitor polls usage in the
//! background.

use std::sync::Arc;

use anyhow::Result;
use fleetcap_engine::{
    api,
    config::Config,
    monitor::{MonitorWorker, TracingSink},
    reconciler::ReconcilerWorker,
    shutdown::{self, SHUTDOWN_TIMEOUT},
    state::AppState,
    Engine,
};
use tokio::sync::{mpsc, watch};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to FLEETCAP_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting fleetcap capacity engine");
    info!(listen_addr = %config.listen_addr, "Configuration loaded");

    let engine = Arc::new(Engine::new(&config, Arc::new(TracingSink))?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (fleet_tx, fleet_rx) = mpsc::channel(config.fleet_event_buffer);

    let reconciler_worker = ReconcilerWorker::new(Arc::clone(engine.reconciler()), fleet_rx);
    let reconciler_handle = tokio::spawn(reconciler_worker.run(shutdown_rx.clone()));

    let monitor_worker = MonitorWorker::new(Arc::clone(engine.monitor()), config.monitor_interval);
    let monitor_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            monitor_worker.run(shutdown_rx).await;
        }
    });

    let state = AppState::new(engine, fleet_tx);
    let app = api::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let mut server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    // The handle is borrowed so an interrupted server can still be drained.
    let server_result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            None
        }
        result = &mut server_handle => Some(result),
    };

    let _ = shutdown_tx.send(true);

    info!("Waiting for workers to shut down...");
    let served = match server_result {
        Some(Ok(result)) => Some(result),
        Some(Err(e)) => {
            error!(error = %e, "Server task panicked");
            None
        }
        None => shutdown::join_within("http server", server_handle, SHUTDOWN_TIMEOUT).await,
    };
    match served {
        Some(Ok(())) => info!("Server exited normally"),
        Some(Err(e)) => error!(error = %e, "Server error"),
        None => {}
    }

    shutdown::join_within("reconciler worker", reconciler_handle, SHUTDOWN_TIMEOUT).await;
    shutdown::join_within("threshold monitor", monitor_handle, SHUTDOWN_TIMEOUT).await;

    info!("Capacity engine shutdown complete");
    Ok(())
}
