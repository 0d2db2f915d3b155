//! HTTP server for the pricing REST API
//!
//! Provides:
//! - Current rates, rate history and forced refresh (/api/v1/rates/*)
//! - Price calculation and multi-item quotes (/api/v1/pricing/*)
//! - Making-charge rule management (/api/v1/making-charges)
//! - Rate limiting so manual refreshes cannot burn upstream quota

use crate::api::handlers;
use crate::api::rate_limiter::{rate_limit_middleware, RateLimiterState};
use crate::error::{AppError, Result};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Build the API router with middleware
pub fn build_router(state: Arc<AppState>, rate_limiter: Arc<RateLimiterState>) -> Router {
    // Build CORS layer (inventory and order services call from other origins)
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ================================================================
        // Health check
        // ================================================================
        .route("/health", get(handlers::health_check))
        .route("/", get(handlers::health_check))

        // ================================================================
        // Rates
        // ================================================================
        .route("/api/v1/rates/current", get(handlers::get_current_rates))
        .route("/api/v1/rates/purity", get(handlers::get_purity_rates))
        .route("/api/v1/rates/history", get(handlers::get_rate_history))
        .route("/api/v1/rates/refresh", post(handlers::refresh_rates))
        .route("/api/v1/rates/cache", delete(handlers::invalidate_cache))

        // ================================================================
        // Pricing
        // ================================================================
        .route("/api/v1/pricing/calculate", post(handlers::calculate_price))
        .route("/api/v1/pricing/quote", post(handlers::quote))
        .route("/api/v1/purities", get(handlers::list_purities))

        // ================================================================
        // Making charges
        // ================================================================
        .route(
            "/api/v1/making-charges",
            get(handlers::list_rules).post(handlers::create_rule),
        )
        .route("/api/v1/making-charges/resolve", get(handlers::resolve_rule))
        .route(
            "/api/v1/making-charges/:id",
            get(handlers::get_rule)
                .put(handlers::update_rule)
                .delete(handlers::delete_rule),
        )

        // ================================================================
        // Add state and middleware
        // ================================================================
        .with_state(state)
        .layer(middleware::from_fn_with_state(rate_limiter, rate_limit_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

/// API server manager
pub struct ApiServer {
    state: Arc<AppState>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl ApiServer {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            shutdown_tx: None,
        }
    }

    /// Bind and start serving; returns the bound address
    pub async fn start(&mut self) -> Result<SocketAddr> {
        let server = &self.state.config.server;

        let addr: SocketAddr = format!("{}:{}", server.host, server.port)
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid address: {}", e)))?;

        info!(
            "Rate limits: API={}/s, Refresh={}/min",
            server.api_rate_limit, server.refresh_rate_limit
        );
        let rate_limiter = Arc::new(RateLimiterState::new(
            server.api_rate_limit,
            server.refresh_rate_limit,
        ));

        let app = build_router(self.state.clone(), rate_limiter);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        self.shutdown_tx = Some(shutdown_tx);

        // Spawn server task
        tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                info!("API server shutting down");
            });

            if let Err(e) = server.await {
                error!("API server error: {}", e);
            }
        });

        info!("Pricing API server listening on {}", local_addr);
        info!("  GET  http://{}/health", local_addr);
        info!("  GET  http://{}/api/v1/rates/current", local_addr);
        info!("  POST http://{}/api/v1/pricing/calculate", local_addr);
        info!("  GET  http://{}/api/v1/making-charges", local_addr);

        Ok(local_addr)
    }

    /// Stop the server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            info!("API server stop signal sent");
        }
    }

}

impl Drop for ApiServer {
    fn drop(&mut self) {
        self.stop();
    }
}
