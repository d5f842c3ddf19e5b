use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures::{SinkExt, Stream, StreamExt};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_tungstenite::tungstenite::{
    self,
    protocol::{frame::coding::CloseCode, CloseFrame},
    Message,
};
use tracing::{debug, info, info_span, warn, Instrument};
use url::Url;

use crate::config::ViewerConfig;
use crate::error::Result;

/// How long an interrupted viewer waits for the relay to answer its close frame
const CLOSE_ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Close frame received from the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl From<CloseFrame> for CloseInfo {
    fn from(frame: CloseFrame) -> Self {
        Self {
            code: u16::from(frame.code),
            reason: frame.reason.as_str().to_owned(),
        }
    }
}

impl fmt::Display for CloseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "code {}", self.code)
        } else {
            write!(f, "code {}: {}", self.code, self.reason)
        }
    }
}

/// How a viewer run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewerExit {
    /// The user stopped the viewer
    Interrupted,
    /// The relay closed the stream, with its close frame if it sent one
    StreamClosed(Option<CloseInfo>),
    /// The connection broke or the output could not be written
    Failed(String),
}

impl ViewerExit {
    /// Interrupts and normal or going-away closes count as success
    #[must_use]
    pub fn is_success(&self) -> bool {
        match self {
            Self::Interrupted | Self::StreamClosed(None) => true,
            Self::StreamClosed(Some(close)) => matches!(close.code, 1000 | 1001),
            Self::Failed(_) => false,
        }
    }
}

impl fmt::Display for ViewerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted => f.write_str("interrupted"),
            Self::StreamClosed(None) => f.write_str("stream closed"),
            Self::StreamClosed(Some(close)) => write!(f, "stream closed ({close})"),
            Self::Failed(msg) => write!(f, "stream failed: {msg}"),
        }
    }
}

/// Follow the configured workload, writing payloads to `output`.
///
/// Returns once the relay closes the stream, the connection fails, or
/// `interrupt` completes. Only failing to reach the relay is an error.
pub async fn run<W, F>(config: &ViewerConfig, output: W, interrupt: F) -> Result<ViewerExit>
where
    W: AsyncWrite + Send + Unpin + 'static,
    F: Future<Output = ()>,
{
    let url = config.endpoint()?;
    let span = info_span!("viewer", workload = %config.workload);
    follow(url, output, interrupt).instrument(span).await
}

async fn follow<W, F>(url: Url, output: W, interrupt: F) -> Result<ViewerExit>
where
    W: AsyncWrite + Send + Unpin + 'static,
    F: Future<Output = ()>,
{
    info!(url = %url, "Connecting to relay");
    let (ws, response) = tokio_tungstenite::connect_async(url.as_str()).await?;
    debug!(status = %response.status(), "Connected to relay");

    let (mut sink, stream) = ws.split();
    let mut receiver = tokio::spawn(receive_loop(stream, output).in_current_span());

    let exit = tokio::select! {
        () = interrupt => {
            info!("Interrupted, closing connection");
            let frame = CloseFrame {
                code: CloseCode::Normal,
                reason: String::from("viewer interrupted").into(),
            };
            let sent = sink.send(Message::Close(Some(frame)));
            match tokio::time::timeout(CLOSE_ACK_TIMEOUT, sent).await {
                Ok(Ok(())) => {
                    if tokio::time::timeout(CLOSE_ACK_TIMEOUT, &mut receiver).await.is_err() {
                        debug!("Relay did not acknowledge close");
                    }
                }
                Ok(Err(e)) => debug!(error = %e, "Failed to send close frame"),
                Err(_) => debug!("Timed out sending close frame"),
            }
            receiver.abort();
            ViewerExit::Interrupted
        }
        joined = &mut receiver => joined.unwrap_or_else(|e| ViewerExit::Failed(e.to_string())),
    };

    Ok(exit)
}

/// Copy message payloads to `output` until the stream ends
async fn receive_loop<S, W>(mut stream: S, mut output: W) -> ViewerExit
where
    S: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut closed: Option<Option<CloseInfo>> = None;

    while let Some(message) = stream.next().await {
        let payload = match message {
            Ok(Message::Text(text)) => text.as_str().as_bytes().to_vec(),
            Ok(Message::Binary(data)) => data.to_vec(),
            Ok(Message::Close(frame)) => {
                let close = frame.map(CloseInfo::from);
                match &close {
                    Some(info) => {
                        info!(code = info.code, reason = %info.reason, "Relay closed stream");
                    }
                    None => info!("Relay closed stream"),
                }
                // Keep polling so the close handshake completes
                closed = Some(close);
                continue;
            }
            Ok(_) => continue,
            Err(e) => {
                if let Some(close) = closed {
                    return ViewerExit::StreamClosed(close);
                }
                warn!(error = %e, "Log stream failed");
                return ViewerExit::Failed(e.to_string());
            }
        };

        let written = async {
            output.write_all(&payload).await?;
            output.flush().await
        };
        if let Err(e) = written.await {
            warn!(error = %e, "Failed to write log output");
            return ViewerExit::Failed(format!("output: {e}"));
        }
    }

    ViewerExit::StreamClosed(closed.flatten())
}
