//! HTTP API server for keyvoice
//!
//! The browser records audio itself and posts the finished blob to a
//! session; everything else is read-mostly access to keywords and stored
//! artifacts.

pub mod artifacts;
mod error;
pub mod health;
pub mod keywords;
pub mod sessions;
pub mod voice;

pub use error::ApiError;
pub use sessions::SessionRegistry;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::app::App;
use crate::config::ServerConfig;
use crate::Result;

/// Shared state for API handlers
#[derive(Clone)]
pub struct ApiState {
    pub app: App,
    pub sessions: SessionRegistry,
}

impl ApiState {
    /// Create state with an empty session registry
    #[must_use]
    pub fn new(app: App) -> Self {
        let sessions = SessionRegistry::new(app.clone());
        Self { app, sessions }
    }
}

/// HTTP API server
pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
    static_dir: Option<PathBuf>,
}

impl ApiServer {
    /// Create a server for the given app
    #[must_use]
    pub fn new(app: App, server: &ServerConfig) -> Self {
        Self {
            state: Arc::new(ApiState::new(app)),
            port: server.port,
            static_dir: server.static_dir.clone(),
        }
    }

    /// Shared handler state
    #[must_use]
    pub fn state(&self) -> Arc<ApiState> {
        Arc::clone(&self.state)
    }

    /// Build the router with all endpoints and layers
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .nest("/api/keywords", keywords::router(self.state.clone()))
            .nest("/api/artifacts", artifacts::router(self.state.clone()))
            .nest("/api/sessions", sessions::router(self.state.clone()))
            .merge(health::router());

        // Serve static files if configured
        if let Some(static_dir) = &self.static_dir {
            let index_file = static_dir.join("index.html");
            let serve_dir = ServeDir::new(static_dir).not_found_service(ServeFile::new(&index_file));

            router = router.fallback_service(serve_dir);
            tracing::info!(path = %static_dir.display(), "serving static files");
        }

        // CORS layer for cross-origin requests from the recorder page
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        router.layer(cors).layer(TraceLayer::new_for_http())
    }

    /// Run the API server
    ///
    /// # Errors
    ///
    /// Returns error if server fails to bind or run
    pub async fn run(self) -> Result<()> {
        let addr = format!("0.0.0.0:{}", self.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| crate::Error::Config(format!("failed to bind API server: {e}")))?;

        tracing::info!(port = self.port, "API server listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| crate::Error::Config(format!("API server error: {e}")))?;

        tracing::info!("API server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
