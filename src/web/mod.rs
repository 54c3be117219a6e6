//! Web layer
//!
//! HTTP surface over the interception boundary: a playlist endpoint that
//! fetches and cleans an upstream manifest, the token relay, and a small
//! control API for the enabled toggle and counters.

use anyhow::Result;
use axum::{
    Router,
    routing::{get, post, put},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::Config;
use crate::services::{Interceptor, TokenRelay};
use crate::utils::ManifestFetcher;

pub mod handlers;
pub mod responses;

pub use responses::{ApiResponse, handle_error};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub interceptor: Interceptor,
    pub fetcher: Arc<dyn ManifestFetcher>,
    pub relay: TokenRelay,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

pub struct WebServer {
    app: Router,
    addr: SocketAddr,
}

impl WebServer {
    pub fn new(state: AppState) -> Result<Self> {
        let addr: SocketAddr =
            format!("{}:{}", state.config.web.host, state.config.web.port).parse()?;
        Ok(Self {
            app: Self::create_router(state),
            addr,
        })
    }

    pub fn create_router(state: AppState) -> Router {
        Router::new()
            .route("/health", get(handlers::health_check))
            .route("/playlist", get(handlers::serve_playlist))
            .route("/gql", post(handlers::relay_gql))
            .nest("/api/v1", Self::api_v1_routes())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    fn api_v1_routes() -> Router<AppState> {
        Router::new()
            .route("/stats", get(handlers::get_stats))
            .route("/enabled", put(handlers::set_enabled))
    }

    pub async fn serve(self) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(&self.addr).await?;
        info!("Listening on http://{}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
