//! Kubernetes pod log source

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, LogParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use tokio_util::compat::FuturesAsyncReadCompatExt;
use tracing::{debug, info};

use super::{effective_container, LogSourceProvider, LogStream};
use crate::config::SourceConfig;
use crate::{Error, LogRequest, Result};

/// Streams pod logs from the API server of the current kube context.
///
/// The client is built once and shared by all sessions.
pub struct KubeLogSource {
    pods: Api<Pod>,
    namespace: String,
    defaults: LogDefaults,
}

/// Log options applied to every request
#[derive(Debug, Clone, Default)]
struct LogDefaults {
    container: Option<String>,
    tail_lines: Option<i64>,
    timestamps: bool,
}

impl KubeLogSource {
    /// Build a client from `source.kubeconfig` when set, otherwise from the
    /// default kubeconfig with in-cluster config as fallback
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let client_config = client_config(config.kubeconfig.as_deref()).await?;
        let client = kube::Client::try_from(client_config).map_err(|e| {
            Error::SourceUnavailable(format!("failed to create Kubernetes client: {e}"))
        })?;
        info!(
            namespace = %config.namespace,
            kubeconfig = ?config.kubeconfig,
            "Kubernetes client initialized"
        );
        Ok(Self::with_client(client, config))
    }

    #[must_use]
    pub fn with_client(client: kube::Client, config: &SourceConfig) -> Self {
        Self {
            pods: Api::namespaced(client, &config.namespace),
            namespace: config.namespace.clone(),
            defaults: LogDefaults {
                container: config.default_container.clone(),
                tail_lines: config.tail_lines,
                timestamps: config.timestamps,
            },
        }
    }
}

async fn client_config(kubeconfig: Option<&str>) -> Result<kube::Config> {
    let Some(path) = kubeconfig else {
        return kube::Config::infer().await.map_err(|e| {
            Error::SourceUnavailable(format!("failed to infer Kubernetes config: {e}"))
        });
    };

    let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
        Error::SourceUnavailable(format!("failed to read kubeconfig {path}: {e}"))
    })?;
    kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
        .await
        .map_err(|e| Error::SourceUnavailable(format!("invalid kubeconfig {path}: {e}")))
}

fn log_params(request: &LogRequest, defaults: &LogDefaults) -> LogParams {
    LogParams {
        container: effective_container(request, defaults.container.as_deref())
            .map(str::to_string),
        follow: request.follow,
        tail_lines: defaults.tail_lines,
        timestamps: defaults.timestamps,
        ..LogParams::default()
    }
}

fn map_kube_error(namespace: &str, request: &LogRequest, err: kube::Error) -> Error {
    match err {
        kube::Error::Api(resp) if resp.code == 404 => {
            Error::WorkloadNotFound(format!("pod {namespace}/{}", request.workload))
        }
        other => Error::SourceUnavailable(other.to_string()),
    }
}

#[async_trait]
impl LogSourceProvider for KubeLogSource {
    fn name(&self) -> &'static str {
        "kubernetes"
    }

    async fn open(&self, request: &LogRequest) -> Result<LogStream> {
        let params = log_params(request, &self.defaults);
        debug!(
            namespace = %self.namespace,
            pod = %request.workload,
            container = ?params.container,
            "Opening pod log stream"
        );

        let reader = self
            .pods
            .log_stream(request.workload.as_str(), &params)
            .await
            .map_err(|e| map_kube_error(&self.namespace, request, e))?;

        Ok(Box::pin(reader.compat()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorkloadId;

    fn request(container: Option<&str>) -> LogRequest {
        LogRequest::follow(
            WorkloadId::parse("webapp").unwrap(),
            container.map(str::to_string),
        )
    }

    #[test]
    fn test_log_params_follow_and_defaults() {
        let defaults = LogDefaults {
            container: Some("main".to_string()),
            tail_lines: Some(50),
            timestamps: true,
        };

        let params = log_params(&request(None), &defaults);
        assert!(params.follow);
        assert_eq!(params.container.as_deref(), Some("main"));
        assert_eq!(params.tail_lines, Some(50));
        assert!(params.timestamps);

        let params = log_params(&request(Some("sidecar")), &defaults);
        assert_eq!(params.container.as_deref(), Some("sidecar"));
    }

    #[tokio::test]
    async fn test_missing_kubeconfig_is_unavailable() {
        let err = client_config(Some("/nonexistent/kubeconfig")).await.unwrap_err();
        assert!(
            matches!(err, Error::SourceUnavailable(ref m) if m.contains("/nonexistent/kubeconfig")),
            "{err}"
        );
    }

    #[tokio::test]
    async fn test_explicit_kubeconfig_is_used() {
        let file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r#"
apiVersion: v1
kind: Config
clusters:
  - name: staging
    cluster:
      server: https://127.0.0.1:6443
users:
  - name: relay
    user:
      token: not-a-real-token
contexts:
  - name: staging
    context:
      cluster: staging
      user: relay
      namespace: logs
current-context: staging
"#,
        )
        .unwrap();

        let config = client_config(file.path().to_str()).await.unwrap();
        assert_eq!(config.cluster_url.host(), Some("127.0.0.1"));
        assert_eq!(config.cluster_url.port_u16(), Some(6443));
        assert_eq!(config.default_namespace, "logs");
    }

    #[test]
    fn test_not_found_maps_to_workload_not_found() {
        let err = kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "pods \"webapp\" not found".to_string(),
            reason: "NotFound".to_string(),
            code: 404,
        });
        let mapped = map_kube_error("default", &request(None), err);
        assert!(matches!(mapped, Error::WorkloadNotFound(ref m) if m == "pod default/webapp"));
    }

    #[test]
    fn test_other_api_errors_are_unavailable() {
        let err = kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "forbidden".to_string(),
            reason: "Forbidden".to_string(),
            code: 403,
        });
        let mapped = map_kube_error("default", &request(None), err);
        assert!(matches!(mapped, Error::SourceUnavailable(_)));
    }
}
