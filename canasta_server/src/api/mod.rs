//! HTTP/WebSocket API for the Canasta lobby and game service.
//!
//! # Architecture
//!
//! - **Axum**: async web framework for the single WebSocket upgrade and the
//!   health check.
//! - **Tower**: CORS middleware.
//! - Game state itself never crosses HTTP; everything flows through the one
//!   WebSocket connection per client (see [`websocket`]).
//!
//! # Endpoints
//!
//! - `GET /ws` - the Request Router/Broadcaster (see [`websocket`])
//! - `GET /health` - liveness/readiness for load balancers

pub mod rate_limiter;
pub mod request_id;
pub mod websocket;

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use canasta_engine::db::{GameRepository, RoomCodeRepository, SessionRepository};
use canasta_engine::{ConnectionMultiplexer, RoomCoordinator, SessionStore};
use serde_json::json;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use websocket::{ActivityLog, ConnHandle};

/// Application state shared across the WebSocket handler and health check.
///
/// Cloned per connection (cheap, every field is an `Arc`).
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<RoomCoordinator>,
    pub sessions: Arc<SessionStore>,
    pub connections: Arc<ConnectionMultiplexer<Uuid, ConnHandle>>,
    pub activity: Arc<ActivityLog>,
    pub games: Arc<dyn GameRepository>,
    pub session_repo: Arc<dyn SessionRepository>,
    pub room_codes: Arc<dyn RoomCodeRepository>,
}

/// Build the router: a single WebSocket upgrade endpoint plus `/health`,
/// with CORS configured from `cors_allowed_origin` (`None` keeps a
/// permissive dev-mode default; `Some(origin)` restricts to that one
/// origin, which is what production deployments set).
pub fn create_router(state: AppState, cors_allowed_origin: Option<String>) -> Router {
    let cors = match cors_allowed_origin.as_deref().map(str::parse::<axum::http::HeaderValue>) {
        Some(Ok(value)) => CorsLayer::new()
            .allow_origin(value)
            .allow_methods(tower_http::cors::Any),
        Some(Err(_)) => {
            tracing::warn!("invalid CORS_ALLOWED_ORIGIN, falling back to permissive CORS");
            CorsLayer::permissive()
        }
        None => CorsLayer::permissive(),
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(websocket::websocket_handler))
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Reports the number of active rooms and live connections; does not touch
/// the database since the Lifecycle Supervisor already failed startup if
/// the store was unreachable.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let room_count = state.coordinator.room_count().await;
    let connection_count = state.connections.connection_count().await;

    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "rooms": room_count,
        "connections": connection_count,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}
