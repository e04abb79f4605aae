//! HTTP server lifecycle.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::web::{self, AppState};

pub struct Server {
    state: Arc<AppState>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        if !config.auth_enabled() {
            tracing::warn!("WEB2APP_SESSION_SECRET not set — upload and build routes will reject every request");
        }
        if config.storage_bucket_id.is_empty() || config.storage_project_id.is_empty() {
            tracing::warn!("Storage project/bucket not configured — logo uploads will fail");
        }
        let state = AppState::new(config);
        if state.relay.is_unrestricted() {
            tracing::warn!(
                "WEB2APP_RELAY_ALLOWED_HOSTS not set — /api/download-apk will fetch from any http(s) host"
            );
        }
        Self { state: Arc::new(state) }
    }

    pub fn router(&self) -> axum::Router {
        web::router(self.state.clone())
    }

    /// Bind `listen_addr` and serve until the process exits.
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.listen_addr.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {addr}"))?;
        tracing::info!(addr = %listener.local_addr()?, "web2app server listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("HTTP server error")
    }

    /// Bind and serve in the background. Returns the bound address, which
    /// is useful with `listen_addr = "127.0.0.1:0"`.
    pub async fn start(self) -> Result<(SocketAddr, JoinHandle<Result<()>>)> {
        let listener = TcpListener::bind(&self.state.config.listen_addr).await?;
        let addr = listener.local_addr()?;
        let app = self.router();
        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await?;
            Ok(())
        });
        Ok((addr, handle))
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
