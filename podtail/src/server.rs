//! Relay server lifecycle
//!
//! Binds the HTTP listener, serves the router until a shutdown signal, then
//! cancels open log sessions and waits for them to drain.

use std::sync::Arc;
use std::time::Duration;

use podtail_api::{create_router, relay::SessionSettings, AppState};
use podtail_core::{shutdown::shutdown_signal, Config, LogSourceProvider};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub struct RelayServer {
    config: Config,
    provider: Arc<dyn LogSourceProvider>,
}

impl RelayServer {
    pub fn new(config: Config, provider: Arc<dyn LogSourceProvider>) -> Self {
        Self { config, provider }
    }

    /// Serve until a shutdown signal, then drain open sessions
    pub async fn start(self) -> anyhow::Result<()> {
        let shutdown = CancellationToken::new();
        let state = AppState::new(
            self.provider.clone(),
            SessionSettings::from(&self.config.relay),
            shutdown.clone(),
        );
        let sessions = state.sessions.clone();
        let router = create_router(state, &self.config.server.path);

        let http_address = self.config.http_address();
        let listener = tokio::net::TcpListener::bind(&http_address)
            .await
            .map_err(|e| anyhow::anyhow!("failed to bind HTTP address {http_address}: {e}"))?;

        info!(
            address = %listener.local_addr()?,
            path = %self.config.server.path,
            provider = self.provider.name(),
            "HTTP server listening"
        );

        let graceful = {
            let shutdown = shutdown.clone();
            async move {
                shutdown_signal().await;
                info!("Shutdown signal received, starting graceful shutdown...");
                // Sessions watch this token and close with "going away"
                shutdown.cancel();
            }
        };

        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(graceful)
            .await
        {
            error!("HTTP server error: {}", e);
        }
        shutdown.cancel();

        sessions.close();
        let drain_timeout = Duration::from_secs(self.config.server.shutdown_drain_seconds);
        if !sessions.is_empty() {
            info!(
                "Waiting up to {}s for {} log session(s) to close...",
                drain_timeout.as_secs(),
                sessions.len()
            );
        }
        if tokio::time::timeout(drain_timeout, sessions.wait()).await.is_err() {
            warn!(
                "Drain timeout reached with {} session(s) still open, proceeding with shutdown",
                sessions.len()
            );
        }

        info!("podtail relay shut down complete");
        Ok(())
    }
}
