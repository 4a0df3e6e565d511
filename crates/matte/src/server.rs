//! Gateway HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::api::create_router;
use crate::config::GatewayConfig;
use crate::remover::BackgroundRemover;

/// Server configuration.
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub gateway: GatewayConfig,
    pub remover: Arc<dyn BackgroundRemover>,
}

/// Run the gateway until Ctrl-C.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let app = create_router(Arc::new(config.gateway), config.remover);

    let listener = TcpListener::bind(config.listen_addr).await?;
    let local_addr = listener.local_addr()?;
    matte_telemetry::log_listening!(address = %local_addr, protocol = "http", "gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    matte_telemetry::log_shutdown!("gateway stopped");
    Ok(())
}

/// Resolves on Ctrl-C. If the handler cannot be installed the server runs
/// until killed.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
