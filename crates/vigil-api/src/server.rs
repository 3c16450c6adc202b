//! HTTP server lifecycle management.
//!
//! Provides [`start_server`] which binds to a TCP port and runs the
//! Axum server until `Ctrl-C` is received.

use std::net::SocketAddr;
use std::sync::Arc;

use serde::Deserialize;
use tokio::net::TcpListener;
use tracing::info;

use crate::router::build_router;
use crate::state::AppState;

/// Configuration for the HTTP server.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// The host address to bind to (e.g. `0.0.0.0`).
    pub host: String,
    /// The TCP port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: String::from("0.0.0.0"),
            port: 8080,
        }
    }
}

/// Start the HTTP server.
///
/// Binds to the configured address, builds the router, and serves
/// requests until `Ctrl-C`. In-flight requests are allowed to finish.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot bind or the server
/// encounters a fatal I/O error.
pub async fn start_server(config: &ServerConfig, state: Arc<AppState>) -> Result<(), ServerError> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| ServerError::Bind(format!("invalid address: {e}")))?;

    let router = build_router(state);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("bind failed on {addr}: {e}")))?;

    info!(%addr, "Vigil API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| ServerError::Serve(format!("serve error: {e}")))?;

    info!("Vigil API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Errors that can occur when starting or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// Failed to bind to the network address.
    #[error("bind error: {0}")]
    Bind(String),

    /// The server encountered a fatal error while serving.
    #[error("serve error: {0}")]
    Serve(String),
}
