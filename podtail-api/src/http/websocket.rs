//! WebSocket entry point for log sessions
//!
//! Validates the request, performs the upgrade and hands the socket to the
//! relay loop. Nothing about the session is created before the upgrade
//! succeeds.

use axum::{
    extract::{
        rejection::QueryRejection,
        ws::{rejection::WebSocketUpgradeRejection, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::{IntoResponse, Response},
};
use futures::StreamExt;
use podtail_core::{workload::parse_container, LogRequest, WorkloadId};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::http::{AppError, AppResult, AppState};
use crate::relay::{self, SessionContext, SessionState};

/// Query parameters for the log WebSocket
#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    /// Workload whose logs are streamed
    #[serde(rename = "podName")]
    pub pod_name: Option<String>,
    /// Optional container within the workload
    pub container: Option<String>,
}

/// Upgrade handler for `GET /logs?podName={name}[&container={name}]`
///
/// A malformed query or an invalid `podName` or `container` is rejected
/// with a JSON 400 before any upgrade is attempted. A request that cannot be
/// upgraded gets 500.
pub async fn logs_handler(
    State(state): State<AppState>,
    query: Result<Query<LogsQuery>, QueryRejection>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> AppResult<Response> {
    let Query(query) = query.map_err(|e| AppError::bad_request(e.body_text()))?;
    let invalid = |e: podtail_core::Error| AppError::bad_request(e.to_string());
    let workload =
        WorkloadId::parse(query.pod_name.as_deref().unwrap_or_default()).map_err(invalid)?;
    let container = parse_container(query.container.as_deref()).map_err(invalid)?;
    let request = LogRequest::follow(workload, container);

    let ws = ws.map_err(|e| {
        warn!(workload = %request.workload, error = %e, "WebSocket upgrade rejected");
        AppError::internal_server_error(format!("websocket upgrade: {e}"))
    })?;

    debug!(
        workload = %request.workload,
        from = %SessionState::Idle,
        to = %SessionState::Upgrading,
        "Upgrading log session"
    );

    let failed_workload = request.workload.clone();
    let sessions = state.sessions.clone();
    Ok(ws
        .on_failed_upgrade(move |e| {
            warn!(
                workload = %failed_workload,
                error = %e,
                state = %SessionState::Closed,
                "WebSocket upgrade failed"
            );
        })
        .on_upgrade(move |socket| sessions.track_future(serve_socket(socket, state, request)))
        .into_response())
}

async fn serve_socket(socket: WebSocket, state: AppState, request: LogRequest) {
    info!(
        workload = %request.workload,
        container = ?request.container,
        "Log session established"
    );

    let (sink, inbound) = socket.split();
    let ctx = SessionContext {
        request,
        provider: state.provider,
        settings: state.settings,
        shutdown: state.shutdown,
    };

    relay::run_session(ctx, sink, inbound).await;
}
