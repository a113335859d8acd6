//! Placer Engine - Solana swap orchestration service
//!
//! Keeps the wallet's token catalog and quoted routes fresh and carries
//! confirmed swap intents through assembly, signing and submission.

use anyhow::Result;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

use placer_engine::assets::DasAssetClient;
use placer_engine::chain::RpcProvider;
use placer_engine::config::Settings;
use placer_engine::engine::{KeypairSigner, SwapEngine};
use placer_engine::metrics::MetricsServer;
use placer_engine::quote::HttpQuoteClient;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    info!("Starting Placer Engine v{}", env!("CARGO_PKG_VERSION"));

    let settings = Settings::load()?;
    info!("Loaded configuration with {} RPC endpoints", settings.rpc.urls.len());

    let signer = Arc::new(KeypairSigner::from_file(Path::new(
        &settings.wallet.keypair_path,
    ))?);
    let rpc = Arc::new(RpcProvider::new(settings.rpc.clone())?);
    let quote_source = Arc::new(HttpQuoteClient::new(
        &settings.quote.base_url,
        settings.rpc.request_timeout_ms,
    ));
    let assets = Arc::new(DasAssetClient::new(
        settings.rpc.urls[0].clone(),
        settings.quote.registry_url.clone(),
        settings.rpc.request_timeout_ms,
    )?);

    // Metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    let engine = Arc::new(SwapEngine::new(
        settings,
        quote_source,
        rpc,
        assets,
        signer,
    )?);

    // Seed both catalog sources before the periodic loop takes over
    if let Err(e) = engine.refresh_registry().await {
        error!("Initial registry fetch: {}", e);
    }
    if let Err(e) = engine.refresh_wallet_assets().await {
        error!("Initial wallet asset fetch: {}", e);
    }

    let engine_handle = tokio::spawn({
        let engine = engine.clone();
        async move {
            if let Err(e) = engine.run().await {
                error!("Swap engine error: {}", e);
            }
        }
    });

    info!("Placer Engine is running");

    shutdown_signal().await;
    info!("Shutdown signal received, stopping...");

    engine.shutdown().await;
    engine_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("Placer Engine stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,placer_engine=debug,hyper=warn"));

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
