// HTTP service for create/status/iterate requests

pub mod handlers;

pub use handlers::{create_router, ApiError};

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use std::net::SocketAddr;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::build::BuildService;
use crate::config::ServerConfig;

/// The build API server
pub struct ForgeServer {
    service: BuildService,
    config: ServerConfig,
}

impl ForgeServer {
    pub fn new(service: BuildService, config: ServerConfig) -> Self {
        Self { service, config }
    }

    /// Router with body limit, CORS and request tracing applied
    pub fn router(&self) -> axum::Router {
        create_router(self.service.clone())
            .layer(DefaultBodyLimit::max(self.config.body_limit_bytes))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until Ctrl-C
    pub async fn serve(self) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .bind_address
            .parse()
            .with_context(|| format!("Invalid bind address {}", self.config.bind_address))?;
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        tracing::info!("AppForge listening on http://{}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::warn!("Failed to listen for Ctrl-C: {}", e);
                    std::future::pending::<()>().await;
                }
                tracing::info!("Shutting down");
            })
            .await
            .context("HTTP server error")?;
        Ok(())
    }
}
