// Module: http
// WebSocket log endpoint and health route

pub mod error;
pub mod health;
pub mod websocket;

use axum::{routing::get, Router};
use podtail_core::LogSourceProvider;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;

use crate::relay::SessionSettings;

pub use error::{AppError, AppResult};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Source of log streams, shared by every session
    pub provider: Arc<dyn LogSourceProvider>,
    pub settings: SessionSettings,
    /// Cancelled when the server shuts down; sessions derive child tokens
    pub shutdown: CancellationToken,
    /// Tracks running sessions so shutdown can drain them
    pub sessions: TaskTracker,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn LogSourceProvider>,
        settings: SessionSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            provider,
            settings,
            shutdown,
            sessions: TaskTracker::new(),
        }
    }
}

/// Create the HTTP router serving the log WebSocket at `logs_path`
pub fn create_router(state: AppState, logs_path: &str) -> Router {
    Router::new()
        .merge(health::create_health_router())
        .route(logs_path, get(websocket::logs_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
