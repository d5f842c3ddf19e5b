//! Log sources
//!
//! A [`LogSourceProvider`] turns a [`LogRequest`] into a byte stream of the
//! workload's log output. The relay is handed one provider at startup and
//! never reaches for orchestrator clients itself.

pub mod command;
#[cfg(feature = "kube")]
pub mod kubernetes;

use async_trait::async_trait;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::info;

use crate::config::{SourceConfig, SourceKind};
use crate::{LogRequest, Result};

/// Readable log output; dropping it releases the underlying handle
pub type LogStream = Pin<Box<dyn AsyncRead + Send>>;

#[async_trait]
pub trait LogSourceProvider: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Open the log stream described by `request`.
    ///
    /// Fails with [`crate::Error::WorkloadNotFound`] when the workload does not
    /// exist and [`crate::Error::SourceUnavailable`] when the source cannot be
    /// reached.
    async fn open(&self, request: &LogRequest) -> Result<LogStream>;
}

/// Construct the provider selected by `config.kind`
pub async fn build_provider(config: &SourceConfig) -> Result<Arc<dyn LogSourceProvider>> {
    let provider: Arc<dyn LogSourceProvider> = match config.kind {
        SourceKind::Command => Arc::new(command::CommandLogSource::new(
            &config.command,
            config.default_container.clone(),
        )),
        #[cfg(feature = "kube")]
        SourceKind::Kubernetes => Arc::new(kubernetes::KubeLogSource::connect(config).await?),
        #[cfg(not(feature = "kube"))]
        SourceKind::Kubernetes => {
            return Err(crate::Error::SourceUnavailable(
                "built without Kubernetes support (enable the `kube` feature)".to_string(),
            ))
        }
    };

    info!(provider = provider.name(), "Log source provider initialized");
    Ok(provider)
}

/// Container to request: the viewer's choice, else the configured default
pub(crate) fn effective_container<'a>(
    request: &'a LogRequest,
    default_container: Option<&'a str>,
) -> Option<&'a str> {
    request.container.as_deref().or(default_container)
}
