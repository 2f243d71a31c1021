// Local preview deployer
//
// Serves a materialized workspace over HTTP from an in-process axum server
// on an ephemeral port. One server per workspace; deploying the same path
// again returns the running server's URL.

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tower_http::services::{ServeDir, ServeFile};

use super::DeploymentProvider;
use crate::config::constants::ENTRY_FILE;
use crate::errors::{ForgeError, ForgeResult};

struct PreviewServer {
    url: String,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct LocalPreviewDeployer {
    host: String,
    servers: Mutex<HashMap<PathBuf, PreviewServer>>,
}

impl LocalPreviewDeployer {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            servers: Mutex::new(HashMap::new()),
        }
    }

    /// Number of previews currently running
    pub async fn running(&self) -> usize {
        self.servers.lock().await.len()
    }

    async fn start(&self, root: PathBuf) -> Result<PreviewServer> {
        let listener = TcpListener::bind((self.host.as_str(), 0))
            .await
            .with_context(|| format!("Failed to bind preview server on {}", self.host))?;
        let port = listener
            .local_addr()
            .context("Preview listener has no local address")?
            .port();

        let display_host = if self.host == "0.0.0.0" {
            "localhost"
        } else {
            self.host.as_str()
        };
        let url = format!("http://{}:{}/", display_host, port);

        let app = preview_router(&root);
        let (shutdown, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = rx.await;
            });
            if let Err(e) = server.await {
                tracing::error!("Preview server error: {}", e);
            }
        });

        tracing::info!(root = %root.display(), %url, "Preview server started");
        Ok(PreviewServer {
            url,
            shutdown,
            handle,
        })
    }
}

/// Static file router: `/` and unknown paths serve `index.html`,
/// traversal attempts get 403
pub(crate) fn preview_router(root: &Path) -> Router {
    let index = root.join(ENTRY_FILE);
    Router::new()
        .fallback_service(ServeDir::new(root).fallback(ServeFile::new(index)))
        .layer(middleware::from_fn(reject_traversal))
}

async fn reject_traversal(request: Request<Body>, next: Next) -> Response {
    let path = request.uri().path().to_ascii_lowercase();
    let traversal = path
        .split('/')
        .any(|segment| matches!(segment, ".." | "%2e%2e" | ".%2e" | "%2e."))
        || path.contains("%2f")
        || path.contains("%5c")
        || path.contains('\\');
    if traversal {
        return (StatusCode::FORBIDDEN, "Forbidden").into_response();
    }
    next.run(request).await
}

#[async_trait]
impl DeploymentProvider for LocalPreviewDeployer {
    async fn deploy(&self, workspace: &Path) -> ForgeResult<String> {
        let root = workspace.to_path_buf();
        let mut servers = self.servers.lock().await;

        if let Some(existing) = servers.get(&root) {
            if !existing.handle.is_finished() {
                return Ok(existing.url.clone());
            }
        }

        let server = self.start(root.clone()).await.map_err(ForgeError::deploy)?;
        let url = server.url.clone();
        servers.insert(root, server);
        Ok(url)
    }

    async fn release(&self, workspace: &Path) -> ForgeResult<bool> {
        let server = self.servers.lock().await.remove(workspace);
        let Some(server) = server else {
            return Ok(false);
        };

        let _ = server.shutdown.send(());
        if let Err(e) = server.handle.await {
            tracing::warn!("Preview server task ended abnormally: {}", e);
        }
        tracing::info!(root = %workspace.display(), "Preview server stopped");
        Ok(true)
    }

    fn name(&self) -> &str {
        "local"
    }
}
