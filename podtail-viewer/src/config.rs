use clap::Parser;
use podtail_core::config::LoggingConfig;
use podtail_core::WorkloadId;
use url::Url;

use crate::error::{Result, ViewerError};

/// Viewer settings, from flags with environment fallbacks
#[derive(Parser, Debug, Clone)]
#[command(name = "podtail-viewer")]
#[command(about = "Follow pod logs through a podtail relay", long_about = None)]
pub struct ViewerConfig {
    /// Relay base URL
    #[arg(long, env = "PODTAIL_RELAY", default_value = "ws://localhost:8080")]
    pub relay: String,

    /// Route of the log WebSocket on the relay
    #[arg(long, env = "PODTAIL_PATH", default_value = "/logs")]
    pub path: String,

    /// Pod whose logs are followed
    #[arg(long, short = 'w', env = "PODTAIL_WORKLOAD", default_value = "webapp")]
    pub workload: String,

    /// Container within the pod
    #[arg(long, short = 'c', env = "PODTAIL_CONTAINER")]
    pub container: Option<String>,

    /// Diagnostic log level (diagnostics go to stderr)
    #[arg(long, env = "PODTAIL_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,

    /// Diagnostic log format: pretty or json
    #[arg(long, env = "PODTAIL_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}

impl ViewerConfig {
    /// Full WebSocket URL for the configured workload
    ///
    /// `http`/`https` relay URLs are mapped to `ws`/`wss`.
    pub fn endpoint(&self) -> Result<Url> {
        let workload = WorkloadId::parse(&self.workload)?;
        let mut url = Url::parse(&self.relay)?;

        let scheme = match url.scheme() {
            "ws" | "http" => "ws",
            "wss" | "https" => "wss",
            other => return Err(ViewerError::UnsupportedScheme(other.to_string())),
        };
        url.set_scheme(scheme)
            .map_err(|()| ViewerError::UnsupportedScheme(url.scheme().to_string()))?;

        url.set_path(&self.path);
        {
            let mut query = url.query_pairs_mut();
            query.clear();
            query.append_pair("podName", workload.as_str());
            if let Some(container) = self.container.as_deref().filter(|c| !c.trim().is_empty()) {
                query.append_pair("container", container);
            }
        }

        Ok(url)
    }

    #[must_use]
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            format: self.log_format.clone(),
            file_path: None,
        }
    }
}
