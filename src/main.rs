use anyhow::Context;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, warn};

use cart_rs::{
    handlers::create_app, init_observability, repositories::create_cart_repository,
    services::CartService, shutdown_observability, Config, Metrics, SystemClock,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_environment().context("Failed to load configuration")?;

    let otlp_endpoint = config
        .observability
        .otlp_endpoint
        .as_deref()
        .filter(|endpoint| !endpoint.is_empty());

    init_observability(
        &config.observability.service_name,
        &config.observability.service_version,
        otlp_endpoint,
        &config.observability.log_level,
        config.observability.enable_json_logging,
    )?;

    info!(
        service = %config.observability.service_name,
        version = %config.observability.service_version,
        "Starting cart service"
    );

    let metrics = Arc::new(Metrics::new()?);

    let cart_repository = create_cart_repository(
        &config.backend,
        Arc::new(SystemClock),
        Some(metrics.clone()),
    )
    .context("Failed to create cart backend")?;
    info!(key_prefix = %config.backend.key_prefix, "Cart repository initialized");

    let cart_service = Arc::new(CartService::new(cart_repository).with_metrics(metrics.clone()));

    let app = create_app(cart_service, metrics, config.server.request_timeout());

    let addr: SocketAddr = config
        .server
        .bind_address()
        .parse()
        .context("Invalid server address")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    shutdown_observability().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
