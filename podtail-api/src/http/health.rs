//! Liveness route reporting relay load

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::http::AppState;

pub const HEALTH_PATH: &str = "/health";

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthStatus {
    /// `ok`, or `draining` once shutdown has begun
    pub status: String,
    /// Log sessions currently being relayed
    pub active_sessions: usize,
}

pub fn create_health_router() -> Router<AppState> {
    Router::new().route(HEALTH_PATH, get(health_check))
}

/// 200 while serving; 503 once the relay stops taking new sessions
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let active_sessions = state.sessions.len();
    if state.shutdown.is_cancelled() {
        let body = HealthStatus {
            status: "draining".to_string(),
            active_sessions,
        };
        return (StatusCode::SERVICE_UNAVAILABLE, Json(body));
    }
    let body = HealthStatus {
        status: "ok".to_string(),
        active_sessions,
    };
    (StatusCode::OK, Json(body))
}
