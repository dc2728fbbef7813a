//! HTTP surface.
//!
//! | route           | methods       | handler                   |
//! |-----------------|---------------|---------------------------|
//! | `/api/files`    | GET           | list a room               |
//! | `/api/download` | GET           | raw content by name       |
//! | `/api/upload`   | POST, OPTIONS | upsert by name            |
//! | `/api/delete`   | GET, DELETE   | tombstone every name match|
//! | `/healthcheck`  | GET           | liveness                  |

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{Method, header},
    routing::get,
};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{self, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

mod error;
mod files;

pub use self::error::{AppError, AppResult};

use crate::state::AppState;

/// The running HTTP server.
pub struct HttpServer {
    addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<std::io::Result<()>>,
}

impl HttpServer {
    /// Bind `addr` and serve in a background task.
    pub async fn spawn(addr: SocketAddr, state: AppState) -> Result<HttpServer> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        let bound_addr = listener.local_addr()?;
        let app = create_app(state);

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let task = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await
        });
        info!("HTTP server listening on {bound_addr}");

        Ok(HttpServer {
            addr: bound_addr,
            shutdown,
            task,
        })
    }

    /// The bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting, let in-flight requests finish, and wait.
    pub async fn shutdown(self) -> Result<()> {
        self.shutdown.cancel();
        self.task.await.context("server task panicked")??;
        Ok(())
    }
}

pub fn create_app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(cors::Any);

    Router::new()
        .route("/api/files", get(files::list).fallback(files::method_not_allowed))
        .route("/api/download", get(files::download).fallback(files::method_not_allowed))
        .route(
            "/api/upload",
            axum::routing::post(files::upload)
                .options(files::preflight)
                .fallback(files::method_not_allowed),
        )
        .route(
            "/api/delete",
            get(files::delete)
                .delete(files::delete)
                .fallback(files::method_not_allowed),
        )
        .route("/healthcheck", get(|| async { "OK" }))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
