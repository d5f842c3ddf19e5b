//! Why a session ended, and what the viewer is told about it

use axum::extract::ws::{close_code, CloseFrame};
use std::fmt;

/// Longest close reason a WebSocket close frame can carry
pub const MAX_CLOSE_REASON_LEN: usize = 123;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndReason {
    /// The source reached end of stream
    SourceEnded,
    /// Reading the source failed
    SourceFailed(String),
    /// The source could not be opened
    SourceUnavailable(String),
    /// No log data within the idle timeout
    IdleTimeout,
    /// The viewer closed the connection or it broke
    ClientGone,
    /// Writing to the viewer failed
    SendFailed(String),
    /// The writer task died and took the socket with it
    WriterFailed(String),
    /// The relay is shutting down
    Shutdown,
}

impl EndReason {
    /// Close code sent to the viewer, or `None` when nobody is listening
    #[must_use]
    pub const fn close_code(&self) -> Option<u16> {
        match self {
            Self::SourceEnded | Self::IdleTimeout => Some(close_code::NORMAL),
            Self::SourceFailed(_) | Self::SourceUnavailable(_) => Some(close_code::ERROR),
            Self::Shutdown => Some(close_code::AWAY),
            Self::ClientGone | Self::SendFailed(_) | Self::WriterFailed(_) => None,
        }
    }

    #[must_use]
    pub fn close_frame(&self) -> Option<CloseFrame> {
        let code = self.close_code()?;
        let text = self.to_string();
        Some(CloseFrame {
            code,
            reason: truncate_reason(&text).to_owned().into(),
        })
    }

    /// Whether the session ended because something went wrong
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::SourceFailed(_)
                | Self::SourceUnavailable(_)
                | Self::SendFailed(_)
                | Self::WriterFailed(_)
        )
    }
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceEnded => f.write_str("log stream ended"),
            Self::SourceFailed(msg) => write!(f, "log stream failed: {msg}"),
            Self::SourceUnavailable(msg) => write!(f, "log source unavailable: {msg}"),
            Self::IdleTimeout => f.write_str("log stream idle"),
            Self::ClientGone => f.write_str("viewer disconnected"),
            Self::SendFailed(msg) => write!(f, "send failed: {msg}"),
            Self::WriterFailed(msg) => write!(f, "relay writer failed: {msg}"),
            Self::Shutdown => f.write_str("relay shutting down"),
        }
    }
}

fn truncate_reason(text: &str) -> &str {
    if text.len() <= MAX_CLOSE_REASON_LEN {
        return text;
    }
    let mut end = MAX_CLOSE_REASON_LEN;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
