//! Sensorhub HTTP Surface
//!
//! Device endpoints, the operator API and the viewer socket, built with Axum.
//!
//! # Endpoints
//!
//! ## Device (HTTP mapping of the node protocol, bodyless errors)
//! - `GET /.well-known/core` - Endpoint discovery (link-format)
//! - `POST /senml` - Ingest a SenML pack
//! - `POST /reg` - Register a node
//!
//! ## Query
//! - `GET /api/v1/nodes` - Full registry snapshot
//! - `GET /api/v1/nodes/:id` - One node
//! - `GET /api/v1/liveness` - Active/stale partition
//!
//! ## Commands
//! - `POST /api/v1/commands` - Relay a command to a node
//!
//! ## Health
//! - `GET /health/live` - Liveness probe
//! - `GET /health/ready` - Readiness probe
//! - `GET /health` - Full health status
//!
//! ## WebSocket
//! - `GET /ws` - Live viewer channel
//!
//! # Example
//!
//! ```rust,ignore
//! use sensorhub::api::{serve, ApiConfig, AppState};
//! use sensorhub::relay::{CommandRelay, HttpTransport, TransportConfig};
//! use sensorhub::telemetry::{Registry, RegistryConfig};
//! use sensorhub::websocket::{EventFanout, FanoutConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let fanout = Arc::new(EventFanout::new(FanoutConfig::default()));
//!     let registry = Arc::new(Registry::new(RegistryConfig::default(), fanout));
//!     let transport = Arc::new(HttpTransport::new(TransportConfig::default())?);
//!     let relay = CommandRelay::new(transport, "sense");
//!     let config = ApiConfig::default();
//!
//!     let state = AppState::new(registry, relay, config.clone());
//!     serve(state, &config).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod dto;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult, DeviceError, DeviceResult};
pub use extract::PeerAddr;
pub use state::{ApiConfig, AppState};

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::websocket::websocket_handler;

/// Build the router with all routes and middleware
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/nodes", get(routes::nodes::list_nodes))
        .route("/nodes/:id", get(routes::nodes::get_node))
        .route("/liveness", get(routes::nodes::liveness))
        .route("/commands", post(routes::commands::send_command));

    let health_routes = Router::new()
        .route("/live", get(routes::health::liveness))
        .route("/ready", get(routes::health::readiness))
        .route("/", get(routes::health::full_health));

    let shared_state = Arc::new(state);

    Router::new()
        // Device endpoints
        .route(
            "/.well-known/core",
            get(routes::discovery::well_known_core).fallback(routes::wrong_method),
        )
        .route(
            "/senml",
            post(routes::ingest::ingest_senml).fallback(routes::wrong_method),
        )
        .route(
            "/reg",
            post(routes::register::register_node).fallback(routes::wrong_method),
        )
        // Viewer channel
        .route("/ws", get(websocket_handler))
        .nest("/api/v1", api_routes)
        .nest("/health", health_routes)
        .fallback(routes::unknown_endpoint)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(shared_state)
}

/// Start the server
pub async fn serve(state: AppState, config: &ApiConfig) -> Result<(), ApiError> {
    let router = build_router(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Sensorhub listening on {}", addr);

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| ApiError::Internal(format!("Server error: {}", e)))?;

    tracing::info!("Sensorhub shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
