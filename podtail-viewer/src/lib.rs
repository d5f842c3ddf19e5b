//! Viewer for the podtail relay
//!
//! Connects to the relay's log WebSocket and copies every message payload to
//! an output until the relay closes the stream or the viewer is interrupted.

pub mod client;
pub mod config;
pub mod error;

pub use client::{run, CloseInfo, ViewerExit};
pub use config::ViewerConfig;
pub use error::{Result, ViewerError};
