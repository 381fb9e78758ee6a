//! HTTP API Server
//!
//! Axum server for the campaign control API.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use axum::http::Method;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::campaign::Orchestrator;
use crate::config::HttpConfig;

use super::auth::AuthState;
use super::handlers::AppState;
use super::routes::create_router;

pub struct HttpServer {
    config: HttpConfig,
    orchestrator: Arc<Orchestrator>,
}

impl HttpServer {
    pub fn new(config: HttpConfig, orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            config,
            orchestrator,
        }
    }

    /// Router with state, auth, CORS and request tracing applied
    pub fn router(&self) -> Router {
        let app_state = AppState {
            orchestrator: self.orchestrator.clone(),
            started_at: Instant::now(),
        };
        let auth_state = AuthState::new(self.config.api_keys.clone());

        let mut app = create_router(app_state, auth_state);

        if self.config.cors_enabled {
            let cors = CorsLayer::new()
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers(Any)
                .allow_origin(Any);
            app = app.layer(cors);
        }

        app.layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(&self, shutdown: broadcast::Receiver<()>) -> Result<()> {
        let addr: SocketAddr = self
            .config
            .listen_addr
            .parse()
            .context("Invalid HTTP listen address")?;

        let listener = TcpListener::bind(&addr)
            .await
            .context("Failed to bind HTTP server")?;

        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener
    pub async fn serve(&self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let app = self.router();
        if let Ok(addr) = listener.local_addr() {
            info!("HTTP API server listening on http://{}", addr);
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                info!("HTTP server shutting down");
            })
            .await
            .context("HTTP server error")?;

        Ok(())
    }
}
