//! Server lifecycle.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use crate::config::ServerConfig;
use crate::http::HttpServer;
use crate::state::{AppState, LocalRelay};

/// A running server and the relay it serves from.
pub struct Server {
    http: HttpServer,
    relay: Arc<LocalRelay>,
}

impl Server {
    /// Start the local relay and the HTTP surface.
    pub async fn spawn(config: ServerConfig) -> Result<Self> {
        let relay = Arc::new(LocalRelay::new(config.mesh.clone()));
        info!(latency_ms = config.mesh.latency_ms, "Local relay started");
        let state = AppState::new(relay.clone(), config.timeouts);
        let http = HttpServer::spawn(config.socket_addr(), state).await?;
        Ok(Self { http, relay })
    }

    pub fn http_addr(&self) -> std::net::SocketAddr {
        self.http.addr()
    }

    pub fn relay(&self) -> &LocalRelay {
        &self.relay
    }

    pub async fn shutdown(self) -> Result<()> {
        self.http.shutdown().await
    }
}

/// Run until Ctrl-C, then shut down.
pub async fn run_with_config_until_ctrl_c(config: ServerConfig) -> Result<()> {
    let server = Server::spawn(config).await?;
    tokio::signal::ctrl_c().await?;
    info!("shutdown");
    server.shutdown().await
}
