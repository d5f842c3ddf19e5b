//! Log source backed by a local command's standard output

use async_trait::async_trait;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, ReadBuf};
use tokio::process::{Child, ChildStdout, Command};
use tracing::debug;

use super::{effective_container, LogSourceProvider, LogStream};
use crate::config::CommandConfig;
use crate::{Error, LogRequest, Result};

const WORKLOAD_PLACEHOLDER: &str = "{workload}";
const CONTAINER_PLACEHOLDER: &str = "{container}";

/// Runs a configured program per session, e.g. `kubectl logs -f {workload}`.
///
/// Arguments are passed straight to the program without a shell. Each
/// placeholder expands inside a single argument, and [`WorkloadId`] only
/// admits RFC 1123 names, so a workload can neither add an argument nor
/// pose as an option or a path.
///
/// [`WorkloadId`]: crate::WorkloadId
pub struct CommandLogSource {
    program: String,
    args: Vec<String>,
    default_container: Option<String>,
}

impl CommandLogSource {
    #[must_use]
    pub fn new(config: &CommandConfig, default_container: Option<String>) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            default_container,
        }
    }

    fn render_args(&self, request: &LogRequest) -> Vec<String> {
        let container = effective_container(request, self.default_container.as_deref())
            .unwrap_or_default();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(WORKLOAD_PLACEHOLDER, request.workload.as_str())
                    .replace(CONTAINER_PLACEHOLDER, container)
            })
            .collect()
    }
}

#[async_trait]
impl LogSourceProvider for CommandLogSource {
    fn name(&self) -> &'static str {
        "command"
    }

    async fn open(&self, request: &LogRequest) -> Result<LogStream> {
        let args = self.render_args(request);
        debug!(program = %self.program, ?args, "Spawning log command");

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::SourceUnavailable(format!("failed to spawn {}: {e}", self.program))
            })?;

        let stdout = child.stdout.take().ok_or_else(|| {
            Error::SourceUnavailable(format!("{} has no stdout pipe", self.program))
        })?;

        Ok(Box::pin(ChildOutput {
            _child: child,
            stdout,
        }))
    }
}

/// Child stdout that keeps the child alive; dropping it kills the child
struct ChildOutput {
    _child: Child,
    stdout: ChildStdout,
}

impl AsyncRead for ChildOutput {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().stdout).poll_read(cx, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorkloadId;
    use tokio::io::AsyncReadExt;

    fn source(program: &str, args: &[&str]) -> CommandLogSource {
        CommandLogSource::new(
            &CommandConfig {
                program: program.to_string(),
                args: args.iter().map(|a| (*a).to_string()).collect(),
            },
            None,
        )
    }

    fn request(workload: &str, container: Option<&str>) -> LogRequest {
        LogRequest::follow(
            WorkloadId::parse(workload).unwrap(),
            container.map(str::to_string),
        )
    }

    #[test]
    fn test_render_args_substitutes_placeholders() {
        let src = source("kubectl", &["logs", "-f", "{workload}", "-c={container}"]);
        let args = src.render_args(&request("webapp", Some("app")));
        assert_eq!(args, vec!["logs", "-f", "webapp", "-c=app"]);
    }

    #[test]
    fn test_render_args_uses_default_container() {
        let src = CommandLogSource::new(
            &CommandConfig {
                program: "kubectl".to_string(),
                args: vec!["--container={container}".to_string()],
            },
            Some("main".to_string()),
        );
        assert_eq!(
            src.render_args(&request("webapp", None)),
            vec!["--container=main"]
        );
        assert_eq!(
            src.render_args(&request("webapp", Some("sidecar"))),
            vec!["--container=sidecar"]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_open_streams_child_stdout() {
        let src = source("printf", &["%s\\n", "{workload}"]);
        let mut stream = src.open(&request("webapp", None)).await.unwrap();

        let mut out = String::new();
        stream.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "webapp\n");
    }

    #[tokio::test]
    async fn test_open_missing_program_is_unavailable() {
        let src = source("/nonexistent/podtail-log-command", &[]);
        let result = src.open(&request("webapp", None)).await;
        assert!(matches!(result, Err(Error::SourceUnavailable(_))));
    }
}
