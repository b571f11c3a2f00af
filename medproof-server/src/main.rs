//! Medproof Server - REST API for file integrity verification
//!
//! Exposes medproof-core over HTTP:
//! - POST /files - Register a file
//! - POST /files/{id}/verify - Verify a copy against a record
//! - GET  /files/{id}/content - Retrieve stored content
//! - GET  /files/{id}/verifications - Audit trail

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use medproof_core::{ServiceConfig, TransactionSigner};
use medproof_server::{create_router_with_config, AppState, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("medproof_server=info,medproof_core=info,tower_http=info")),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env();
    let service_config = ServiceConfig::from_env();

    let signer = Arc::new(service_config.load_signer()?);
    tracing::info!(identities = signer.identities().len(), "Loaded signing keys");
    let service = service_config.connect(signer).await?;

    let app = create_router_with_config(AppState::new(service), &config);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Medproof server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
