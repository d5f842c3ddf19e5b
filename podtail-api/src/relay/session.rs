//! Session execution: pump a log stream into a WebSocket
//!
//! The session task reads the source one bounded chunk at a time and pushes
//! each chunk onto a bounded queue. A writer task owns the socket's sink and
//! is its only writer, so the queue filling up is what slows the reader down
//! when the viewer is slow. A watcher task owns the inbound half and halts
//! the session as soon as the viewer goes away, even if the source read is
//! blocked waiting for the next log line.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use bytes::Bytes;
use futures::{Sink, SinkExt, Stream, StreamExt};
use podtail_core::config::RelayConfig;
use podtail_core::{LogRequest, LogSourceProvider, LogStream};
use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use super::close::EndReason;

/// Lifecycle of a log session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Upgrading,
    Streaming,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Upgrading => "upgrading",
            Self::Streaming => "streaming",
            Self::Closing => "closing",
            Self::Closed => "closed",
        })
    }
}

/// Per-session tuning derived from [`RelayConfig`]
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub chunk_size: usize,
    pub queue_capacity: usize,
    pub chunk_interval: Option<Duration>,
    pub idle_timeout: Option<Duration>,
    pub open_timeout: Duration,
    pub close_timeout: Duration,
}

impl From<&RelayConfig> for SessionSettings {
    fn from(config: &RelayConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            queue_capacity: config.queue_capacity.max(1),
            chunk_interval: config.chunk_interval(),
            idle_timeout: config.idle_timeout(),
            open_timeout: config.open_timeout(),
            close_timeout: config.close_timeout(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self::from(&RelayConfig::default())
    }
}

/// Everything a session needs besides the socket
pub struct SessionContext {
    pub request: LogRequest,
    pub provider: Arc<dyn LogSourceProvider>,
    pub settings: SessionSettings,
    /// Server-wide shutdown token
    pub shutdown: CancellationToken,
}

/// Outcome of one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub reason: EndReason,
    pub chunks_sent: u64,
    pub bytes_sent: u64,
}

/// Relay the requested log stream to `sink` until either side stops.
///
/// `sink` and `inbound` are the two halves of the viewer's socket. Both are
/// released, and the log stream dropped, before this returns.
pub async fn run_session<S, R, E>(ctx: SessionContext, sink: S, inbound: R) -> SessionReport
where
    S: Sink<Message> + Send + Unpin + 'static,
    S::Error: fmt::Display + Send,
    R: Stream<Item = Result<Message, E>> + Send + Unpin + 'static,
    E: fmt::Display + Send + 'static,
{
    let span = info_span!(
        "log_session",
        workload = %ctx.request.workload,
        container = ?ctx.request.container,
    );
    drive(ctx, sink, inbound).instrument(span).await
}

async fn drive<S, R, E>(ctx: SessionContext, sink: S, inbound: R) -> SessionReport
where
    S: Sink<Message> + Send + Unpin + 'static,
    S::Error: fmt::Display + Send,
    R: Stream<Item = Result<Message, E>> + Send + Unpin + 'static,
    E: fmt::Display + Send + 'static,
{
    // The handler has already accepted the upgrade
    let mut state = SessionState::Upgrading;
    let halt = ctx.shutdown.child_token();
    let peer_gone = CancellationToken::new();

    transition(&mut state, SessionState::Streaming);

    let mut watcher =
        tokio::spawn(watch_peer(inbound, halt.clone(), peer_gone.clone()).in_current_span());
    let (tx, rx) = mpsc::channel(ctx.settings.queue_capacity);
    let writer = tokio::spawn(forward_chunks(sink, rx, halt.clone()).in_current_span());

    let source_end = match open_source(&ctx, &halt).await {
        Ok(stream) => pump(stream, tx, &halt, &ctx.settings).await,
        Err(end) => {
            drop(tx);
            end
        }
    };

    transition(&mut state, SessionState::Closing);

    let exit = match writer.await {
        Ok(exit) => exit,
        Err(e) => {
            // The sink went down with the task, so no close frame can be sent
            watcher.abort();
            transition(&mut state, SessionState::Closed);
            let report = SessionReport {
                reason: EndReason::WriterFailed(e.to_string()),
                chunks_sent: 0,
                bytes_sent: 0,
            };
            warn!(
                reason = %report.reason,
                "Log session closed; sent chunk counts unknown"
            );
            return report;
        }
    };

    let reason = resolve_reason(exit.error, source_end, peer_gone.is_cancelled());
    let close_timeout = ctx.settings.close_timeout;
    let mut sink = exit.sink;

    if let Some(frame) = reason.close_frame() {
        match tokio::time::timeout(close_timeout, sink.send(Message::Close(Some(frame)))).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "Failed to send close frame"),
            Err(_) => debug!("Timed out sending close frame"),
        }
    }
    match tokio::time::timeout(close_timeout, sink.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(error = %e, "Failed to close WebSocket"),
        Err(_) => debug!("Timed out closing WebSocket"),
    }

    // Give the viewer a moment to acknowledge the close frame
    if !peer_gone.is_cancelled() {
        let acked = tokio::time::timeout(close_timeout, &mut watcher).await;
        if acked.is_err() {
            debug!("Viewer did not acknowledge close");
        }
    }
    watcher.abort();
    drop(sink);

    transition(&mut state, SessionState::Closed);

    let report = SessionReport {
        reason,
        chunks_sent: exit.chunks,
        bytes_sent: exit.bytes,
    };
    if report.reason.is_failure() {
        warn!(
            reason = %report.reason,
            chunks = report.chunks_sent,
            bytes = report.bytes_sent,
            "Log session closed"
        );
    } else {
        info!(
            reason = %report.reason,
            chunks = report.chunks_sent,
            bytes = report.bytes_sent,
            "Log session closed"
        );
    }
    report
}

fn transition(state: &mut SessionState, next: SessionState) {
    debug!(from = %state, to = %next, "Session state changed");
    *state = next;
}

/// Decide why the session ended.
///
/// A vanished viewer wins, since nothing else can be reported to it; then a
/// failed write; then whatever stopped the source. A halted source with none
/// of those means the server is shutting down.
fn resolve_reason(
    writer_error: Option<String>,
    source_end: Option<EndReason>,
    peer_gone: bool,
) -> EndReason {
    if peer_gone {
        return EndReason::ClientGone;
    }
    if let Some(error) = writer_error {
        return EndReason::SendFailed(error);
    }
    source_end.unwrap_or(EndReason::Shutdown)
}

/// Open the log stream, giving up early if the session is halted.
///
/// `Err(None)` means the session was halted before the source answered.
async fn open_source(
    ctx: &SessionContext,
    halt: &CancellationToken,
) -> Result<LogStream, Option<EndReason>> {
    let open = tokio::time::timeout(ctx.settings.open_timeout, ctx.provider.open(&ctx.request));

    tokio::select! {
        biased;
        () = halt.cancelled() => Err(None),
        opened = open => match opened {
            Ok(Ok(stream)) => {
                debug!(provider = ctx.provider.name(), "Log stream opened");
                Ok(stream)
            }
            Ok(Err(e)) => {
                warn!(provider = ctx.provider.name(), error = %e, "Failed to open log stream");
                Err(Some(EndReason::SourceUnavailable(e.to_string())))
            }
            Err(_) => {
                warn!(
                    provider = ctx.provider.name(),
                    timeout = ?ctx.settings.open_timeout,
                    "Timed out opening log stream"
                );
                Err(Some(EndReason::SourceUnavailable(format!(
                    "timed out after {:?}",
                    ctx.settings.open_timeout
                ))))
            }
        }
    }
}

/// Read chunks from `stream` into the outbound queue.
///
/// Returns `None` when halted from outside, otherwise the reason the source
/// stopped. The stream is dropped before returning.
async fn pump(
    mut stream: LogStream,
    tx: mpsc::Sender<Bytes>,
    halt: &CancellationToken,
    settings: &SessionSettings,
) -> Option<EndReason> {
    let mut buf = vec![0u8; settings.chunk_size];
    let mut forwarded = false;

    let end = loop {
        if forwarded {
            if let Some(interval) = settings.chunk_interval {
                tokio::select! {
                    biased;
                    () = halt.cancelled() => break None,
                    () = tokio::time::sleep(interval) => {}
                }
            }
        }

        let read = tokio::select! {
            biased;
            () = halt.cancelled() => break None,
            read = async {
                match settings.idle_timeout {
                    Some(idle) => tokio::time::timeout(idle, stream.read(&mut buf)).await.ok(),
                    None => Some(stream.read(&mut buf).await),
                }
            } => read,
        };

        let n = match read {
            Some(Ok(0)) => break Some(EndReason::SourceEnded),
            Some(Ok(n)) => n,
            Some(Err(e)) => {
                warn!(error = %e, "Log stream read failed");
                break Some(EndReason::SourceFailed(e.to_string()));
            }
            None => {
                info!("Log stream idle, closing session");
                break Some(EndReason::IdleTimeout);
            }
        };

        let chunk = Bytes::copy_from_slice(&buf[..n]);
        tokio::select! {
            biased;
            () = halt.cancelled() => break None,
            sent = tx.send(chunk) => {
                if sent.is_err() {
                    break None;
                }
            }
        }
        forwarded = true;
    };

    drop(stream);
    debug!("Log stream released");
    end
}

struct WriterExit<S> {
    sink: S,
    error: Option<String>,
    chunks: u64,
    bytes: u64,
}

/// Sole writer of the socket: send queued chunks until the queue closes.
async fn forward_chunks<S>(
    mut sink: S,
    mut rx: mpsc::Receiver<Bytes>,
    halt: CancellationToken,
) -> WriterExit<S>
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    // Stops the reader too if this task dies mid-send
    let _halt_on_exit = halt.clone().drop_guard();
    let mut chunks = 0u64;
    let mut bytes = 0u64;

    let error = loop {
        let chunk = tokio::select! {
            biased;
            () = halt.cancelled() => break None,
            chunk = rx.recv() => match chunk {
                Some(chunk) => chunk,
                None => break None,
            },
        };

        let len = chunk.len() as u64;
        let sent = tokio::select! {
            biased;
            () = halt.cancelled() => break None,
            sent = sink.send(chunk_message(chunk)) => sent,
        };

        if let Err(e) = sent {
            let error = e.to_string();
            warn!(error = %error, "Failed to send log chunk");
            halt.cancel();
            break Some(error);
        }
        chunks += 1;
        bytes += len;
    };

    WriterExit {
        sink,
        error,
        chunks,
        bytes,
    }
}

/// One chunk as one message: text when it is valid UTF-8, binary otherwise
fn chunk_message(chunk: Bytes) -> Message {
    match String::from_utf8(chunk.to_vec()) {
        Ok(text) => Message::Text(text.into()),
        Err(_) => Message::Binary(chunk),
    }
}

/// Drain the inbound half until the viewer closes or the connection breaks
async fn watch_peer<R, E>(mut inbound: R, halt: CancellationToken, peer_gone: CancellationToken)
where
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: fmt::Display,
{
    while let Some(message) = inbound.next().await {
        match message {
            Ok(Message::Close(frame)) => {
                debug!(?frame, "Viewer sent close frame");
                break;
            }
            // Viewers have nothing to say; pings are answered by the transport
            Ok(_) => {}
            Err(e) => {
                debug!(error = %e, "Viewer connection failed");
                break;
            }
        }
    }
    peer_gone.cancel();
    halt.cancel();
}
