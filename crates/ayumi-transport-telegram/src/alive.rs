//! HTTP alive endpoint for uptime monitors.

use anyhow::{Context, Result};
use axum::routing::get;
use axum::Router;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Body returned by `GET /`.
pub const ALIVE_TEXT: &str = "Ayumi Bot is alive!";

async fn alive() -> &'static str {
    ALIVE_TEXT
}

/// Router serving the alive endpoint.
pub fn alive_router() -> Router {
    Router::new().route("/", get(alive))
}

/// Bind the endpoint on every interface at `port`.
///
/// # Errors
///
/// Returns an error if the port cannot be bound.
pub async fn bind_alive(port: u16) -> Result<TcpListener> {
    let bind_addr = SocketAddr::from(([0, 0, 0, 0], port));
    TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind alive endpoint on {bind_addr}"))
}

/// Serve the endpoint until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the server stops unexpectedly.
pub async fn serve_alive(listener: TcpListener, shutdown: CancellationToken) -> Result<()> {
    let local_addr = listener
        .local_addr()
        .context("failed to resolve alive endpoint address")?;
    info!("🌐 Web server running on {local_addr}");

    axum::serve(listener, alive_router())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("alive endpoint exited unexpectedly")
}
